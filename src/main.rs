use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use storefront_checkout::{
    config::{self, AppConfig},
    entities::commerce::{subtotal, LineItem, Receiver, VariantKey},
    errors::ServiceError,
    events,
    services::{
        commerce::{
            CartStore, CheckoutSummary, Navigator, OnlineMethod, PaymentVerification,
            StockGuard, SubmissionOutcome, TotalReconciliation,
        },
        ServiceFactory,
    },
};
use tracing::debug;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Cart(command) => handle_cart_command(&context, command, cli.json).await?,
        Commands::Checkout(args) => handle_checkout(&context, args, cli.json).await?,
        Commands::PaymentReturn(args) => handle_payment_return(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront cart and checkout client", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Cart(CartCommands),
    /// Run checkout for the current cart and submit the order
    Checkout(CheckoutArgs),
    /// Verify the query string the payment gateway returned with
    PaymentReturn(PaymentReturnArgs),
}

#[derive(Subcommand)]
enum CartCommands {
    Show,
    Add(CartAddArgs),
    Set(CartSetArgs),
    Remove(CartRemoveArgs),
    Clear,
}

#[derive(Args)]
struct CartAddArgs {
    #[arg(long, help = "Catalog product id")]
    product: String,
    #[arg(long, help = "Variant size, e.g. M")]
    size: String,
    #[arg(long, help = "Variant color when the product has several")]
    color: Option<String>,
    #[arg(long, default_value_t = 1, help = "Units to add")]
    quantity: u32,
}

#[derive(Args)]
struct CartSetArgs {
    #[arg(help = "Row number as shown by `cart show`, starting at 1")]
    row: usize,
    #[arg(help = "New quantity (at least 1)")]
    quantity: u32,
}

#[derive(Args)]
struct CartRemoveArgs {
    #[arg(help = "Row number as shown by `cart show`, starting at 1")]
    row: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum PaymentArg {
    Cash,
    Card,
    Momo,
}

#[derive(Args)]
struct CheckoutArgs {
    #[arg(long, help = "Receiver name")]
    name: String,
    #[arg(long, help = "Receiver phone number")]
    phone: String,
    #[arg(long, help = "Delivery address")]
    address: String,
    #[arg(long, help = "Shipping option id from the configured fee table")]
    shipping: String,
    #[arg(long, help = "Optional coupon code")]
    coupon: Option<String>,
    #[arg(long, value_enum, help = "Payment method")]
    payment: PaymentArg,
    #[arg(long, default_value = "", help = "Note for the shop")]
    note: String,
}

#[derive(Args)]
struct PaymentReturnArgs {
    #[arg(help = "Return URL or its query string")]
    query: String,
    #[arg(long, help = "Order total the signed return must report, when known")]
    amount: Option<Decimal>,
}

struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn redirect(&self, url: &Url) {
        println!("Continue to payment: {}", url);
    }
}

struct CliContext {
    factory: ServiceFactory,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let factory = ServiceFactory::from_config(config, Arc::new(StdoutNavigator))
            .map_err(user_error)
            .context("failed to initialize storefront client")?;

        let event_rx = factory.event_sender().subscribe();
        tokio::spawn(events::process_events(event_rx));
        debug!(target: "storefront", "event processor started");

        Ok(Self { factory })
    }

    fn config(&self) -> &AppConfig {
        self.factory.config()
    }

    async fn cart(&self) -> Result<Arc<CartStore>> {
        self.factory
            .cart_store()
            .await
            .map_err(user_error)
            .context("failed to load cart")
    }
}

fn user_error(err: ServiceError) -> anyhow::Error {
    anyhow!("{} [{}]", err.user_message(), err.code())
}

fn row_index(row: usize) -> Result<usize> {
    row.checked_sub(1)
        .ok_or_else(|| anyhow!("rows are numbered from 1"))
}

async fn handle_cart_command(context: &CliContext, command: CartCommands, json: bool) -> Result<()> {
    let cart = context.cart().await?;

    match command {
        CartCommands::Show => {}
        CartCommands::Add(args) => {
            let stock = context.factory.stock_guard();
            let product = stock
                .fetch_product(&args.product)
                .await
                .map_err(user_error)?;
            let key = VariantKey::new(&args.size, args.color.as_deref());
            StockGuard::check_add(&product, &key, &cart.items().await, args.quantity)
                .map_err(user_error)?;
            cart.add(&product.id, key, product.line_data(), args.quantity)
                .await
                .map_err(user_error)?;
        }
        CartCommands::Set(args) => {
            cart.set_quantity(row_index(args.row)?, args.quantity)
                .await
                .map_err(user_error)?;
        }
        CartCommands::Remove(args) => {
            if cart
                .remove(row_index(args.row)?)
                .await
                .map_err(user_error)?
                .is_none()
            {
                println!("No row {} in the cart", args.row);
            }
        }
        CartCommands::Clear => cart.clear().await.map_err(user_error)?,
    }

    render_cart(context.config(), &cart.items().await, json)
}

async fn handle_checkout(context: &CliContext, args: CheckoutArgs, json: bool) -> Result<()> {
    let cart = context.cart().await?;
    let items = cart.items().await;
    if items.is_empty() {
        return Err(anyhow!("your cart is empty"));
    }

    context
        .factory
        .stock_guard()
        .revalidate_cart(&items)
        .await
        .map_err(user_error)?;

    let mut checkout = context.factory.checkout(items, None);
    checkout
        .set_receiver(Receiver::new(&args.name, &args.phone, &args.address))
        .map_err(user_error)?;
    checkout.select_shipping(&args.shipping).map_err(user_error)?;

    match args.coupon.as_deref() {
        Some(code) => {
            if let Err(e) = checkout.apply_coupon(code).await {
                eprintln!("Coupon not applied: {}", e.user_message());
            }
        }
        None => checkout.skip_coupon(),
    }

    match args.payment {
        PaymentArg::Cash => checkout.select_cash(),
        PaymentArg::Card | PaymentArg::Momo => {
            checkout.select_online();
            let method = match args.payment {
                PaymentArg::Card => OnlineMethod::Card,
                _ => OnlineMethod::Momo,
            };
            checkout.select_online_method(method).map_err(user_error)?;
        }
    }
    checkout.set_note(&args.note);

    let summary = checkout.summary();
    let draft = checkout.finalize().map_err(user_error)?;
    let outcome = context
        .factory
        .order_submission(cart)
        .submit(&draft)
        .await
        .map_err(user_error)?;

    if json {
        #[derive(Serialize)]
        struct CheckoutOutput<'a> {
            summary: &'a CheckoutSummary,
            order_id: &'a str,
            charged_total: String,
            pay_url: Option<String>,
        }
        let pay_url = match &outcome {
            SubmissionOutcome::AwaitingPayment { redirect, .. } => Some(redirect.pay_url.to_string()),
            SubmissionOutcome::Completed { .. } => None,
        };
        return print_json(&CheckoutOutput {
            summary: &summary,
            order_id: &outcome.order().id,
            charged_total: outcome.reconciliation().charged_total().to_string(),
            pay_url,
        });
    }

    let currency = &context.config().currency;
    println!(
        "Subtotal {} • shipping {} • discount {} {}",
        summary.subtotal, summary.shipping_fee, summary.discount, currency
    );
    match outcome.reconciliation() {
        TotalReconciliation::Mismatch {
            estimated,
            server_total,
        } => println!(
            "Note: the store confirmed a total of {} {} (estimated {})",
            server_total, currency, estimated
        ),
        TotalReconciliation::Unconfirmed { estimated } => println!(
            "Note: the store did not confirm a total; the estimate was {} {}",
            estimated, currency
        ),
        TotalReconciliation::Ok { .. } => {}
    }
    match &outcome {
        SubmissionOutcome::Completed { order, reconciliation } => println!(
            "Order {} placed • total {} {} • {}",
            order.id,
            reconciliation.charged_total(),
            currency,
            draft.payment_method
        ),
        SubmissionOutcome::AwaitingPayment { order, .. } => println!(
            "Order {} created and awaiting payment; finish paying in the gateway",
            order.id
        ),
    }
    Ok(())
}

async fn handle_payment_return(
    context: &CliContext,
    args: PaymentReturnArgs,
    json: bool,
) -> Result<()> {
    let outcome = context
        .factory
        .payment_gateway()
        .reconcile_expecting(&args.query, args.amount)
        .await;

    if json {
        return print_json(&outcome.verification);
    }

    match &outcome.verification {
        PaymentVerification::Verified {
            order_id,
            transaction_id,
        } => println!(
            "Payment for order {} confirmed{}",
            order_id,
            transaction_id
                .as_deref()
                .map(|t| format!(" (transaction {})", t))
                .unwrap_or_default()
        ),
        PaymentVerification::Pending { order_id } => {
            println!("Payment for order {} is still processing", order_id)
        }
        PaymentVerification::Failed { order_id, reason } => println!(
            "Payment for order {} failed: {}",
            order_id.as_deref().unwrap_or("unknown"),
            reason
        ),
    }
    println!(
        "Returning to the shop in {}s",
        outcome.redirect_after.as_secs()
    );
    Ok(())
}

fn render_cart(config: &AppConfig, items: &[LineItem], json: bool) -> Result<()> {
    if json {
        return print_json(&items);
    }

    if items.is_empty() {
        println!("Your cart is empty");
        return Ok(());
    }
    for (row, item) in items.iter().enumerate() {
        println!(
            "{:>2}. {} ({}) • {} x {} = {} {}",
            row + 1,
            item.name,
            item.variant_key,
            item.quantity,
            item.unit_price,
            item.line_total(),
            config.currency
        );
    }
    println!("Total: {} {}", subtotal(items), config.currency);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
