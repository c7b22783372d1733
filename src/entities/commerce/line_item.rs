use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a purchasable configuration of a product.
///
/// Rendered as `size` or `color/size`. Comparison ignores case and
/// surrounding whitespace so that `Red/M` and `red/m ` refer to the same row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(String);

impl VariantKey {
    pub fn new(size: &str, color: Option<&str>) -> Self {
        let size = size.trim();
        match color.map(str::trim).filter(|c| !c.is_empty()) {
            Some(color) => Self(format!("{}/{}", color, size)),
            None => Self(size.to_string()),
        }
    }

    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A key with no size component cannot be deducted from inventory.
    pub fn is_empty(&self) -> bool {
        self.0
            .rsplit('/')
            .next()
            .map_or(true, |size| size.trim().is_empty())
    }

    fn normalized(&self) -> String {
        self.0.trim().to_lowercase()
    }
}

impl PartialEq for VariantKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for VariantKey {}

impl Hash for VariantKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display data captured when a product is added to the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineData {
    pub name: String,
    pub unit_price: Decimal,
    pub image_ref: Option<String>,
}

/// One cart row, unique per (product, variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub variant_key: VariantKey,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl LineItem {
    pub fn new(product_id: &str, variant_key: VariantKey, line: LineData, quantity: u32) -> Self {
        Self {
            product_id: product_id.to_string(),
            variant_key,
            name: line.name,
            unit_price: line.unit_price,
            quantity,
            image_ref: line.image_ref,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn matches(&self, product_id: &str, variant_key: &VariantKey) -> bool {
        self.product_id == product_id && &self.variant_key == variant_key
    }
}

/// Σ(unit price × quantity) over the given items.
pub fn subtotal(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::line_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, quantity: u32) -> LineItem {
        LineItem::new(
            "p1",
            VariantKey::new("M", None),
            LineData {
                name: "Tee".into(),
                unit_price: price,
                image_ref: None,
            },
            quantity,
        )
    }

    #[test]
    fn variant_key_renders_color_and_size() {
        assert_eq!(VariantKey::new("M", Some("Red")).as_str(), "Red/M");
        assert_eq!(VariantKey::new(" L ", Some("  ")).as_str(), "L");
    }

    #[test]
    fn variant_key_comparison_ignores_case() {
        assert_eq!(VariantKey::parse("Red/M"), VariantKey::parse(" red/m"));
        assert_ne!(VariantKey::parse("Red/M"), VariantKey::parse("Red/L"));
    }

    #[test]
    fn variant_key_without_size_is_empty() {
        assert!(VariantKey::parse("").is_empty());
        assert!(VariantKey::parse("Red/").is_empty());
        assert!(!VariantKey::parse("XL").is_empty());
    }

    #[test]
    fn line_item_serializes_camel_case() {
        let json = serde_json::to_value(item(dec!(100000), 2)).expect("serializes");
        assert_eq!(json["productId"], "p1");
        assert_eq!(json["variantKey"], "M");
        assert_eq!(json["quantity"], 2);
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let items = vec![item(dec!(25.50), 3), item(dec!(19.99), 1)];
        assert_eq!(subtotal(&items), dec!(96.49));
        assert_eq!(subtotal(&[]), Decimal::ZERO);
    }
}
