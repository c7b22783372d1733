use super::line_item::{LineData, VariantKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A size/color configuration with its own stock count. Catalog-owned and
/// never mutated by the checkout pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default)]
    pub product_id: String,
    pub size: String,
    #[serde(default)]
    pub color: Option<String>,
    pub stock: u32,
}

impl Variant {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(&self.size, self.color.as_deref())
    }
}

/// Catalog product as returned by the variant lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Product {
    pub fn find_variant(&self, key: &VariantKey) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.key() == key)
    }

    pub fn line_data(&self) -> LineData {
        LineData {
            name: self.name.clone(),
            unit_price: self.price,
            image_ref: self.image.clone(),
        }
    }
}
