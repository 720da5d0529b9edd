//! # Seed Data Generator
//!
//! Populates a ledger with demo bills, products and sales for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in ledger.toml (or ./tally.db)
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./tally.db
//!
//! # Use an explicit config file
//! cargo run -p tally-db --bin seed -- --config ./ledger.toml
//! ```
//!
//! ## Generated Data
//! - Three supplier bills, each with a handful of line items
//! - A bill reduction on the first bill
//! - A cash sale and a due sale with a partial customer payment
//! - A supplier payment on every bill

use std::env;
use std::path::PathBuf;

use tally_core::balance::Allocation;
use tally_core::checkout::{CartLine, CheckoutRequest, CustomerIdentity, Discount, PricingAdjustments};
use tally_core::{AdjustmentType, Money, PaymentMethod, ProductRef, Rate};
use tally_db::{
    CustomerPaymentRequest, Database, LedgerConfig, NewAdjustment, NewBill, NewProduct,
    SupplierPaymentRequest,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo bills: (bill number, items of (barcode, name, quantity, unit cents, retail cents)).
const BILLS: &[(&str, &[(&str, &str, i64, i64, i64)])] = &[
    (
        "BILL-1001",
        &[
            ("8941100500019", "Basmati Rice 5kg", 40, 62_000, 75_000),
            ("8941100500026", "Soybean Oil 2L", 60, 31_000, 36_500),
            ("8941100500033", "Red Lentils 1kg", 80, 11_500, 14_000),
        ],
    ),
    (
        "BILL-1002",
        &[
            ("8941100600016", "Black Tea 400g", 50, 18_000, 22_000),
            ("8941100600023", "Powdered Milk 1kg", 30, 68_000, 79_000),
        ],
    ),
    (
        "BILL-1003",
        &[
            ("8941100700013", "Bath Soap 150g", 120, 4_500, 6_000),
            ("8941100700020", "Detergent 1kg", 45, 13_000, 16_500),
            ("8941100700037", "Toothpaste 200g", 70, 9_500, 12_500),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tally_db=debug".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (overrides config)");
                println!("  -c, --config <PATH>    Config file (default: platform ledger.toml)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Bills and their line items
    for (bill_number, items) in BILLS {
        let deal: i64 = items.iter().map(|(_, _, qty, unit, _)| qty * unit).sum();
        let bill = db
            .bills()
            .create(NewBill {
                bill_number: bill_number.to_string(),
                supplier_id: None,
                deal_amount: Money::from_cents(deal),
                base_paid: Money::zero(),
            })
            .await?;

        for (barcode, name, quantity, unit, retail) in items.iter() {
            db.products()
                .insert(&NewProduct {
                    bill_number: bill.bill_number.clone(),
                    barcode: barcode.to_string(),
                    name: name.to_string(),
                    quantity: *quantity,
                    unit_price: Money::from_cents(*unit),
                    retail_price: Money::from_cents(*retail),
                })
                .await?;
        }

        db.supplier_payments()
            .record_payment(SupplierPaymentRequest {
                bill_number: bill.bill_number.clone(),
                amount: Money::from_cents(deal / 4),
                method: PaymentMethod::BankTransfer,
                reference: Some(format!("ADV-{}", bill.bill_number)),
                paid_at: None,
            })
            .await?;

        println!(
            "✓ Bill {} ({}) with {} items, deal {}",
            bill.bill_number,
            bill.supplier_id,
            items.len(),
            bill.deal_amount()
        );
    }

    // Two damaged sacks of rice go back to the supplier
    db.adjustments()
        .create(NewAdjustment {
            bill_number: "BILL-1001".into(),
            barcode: "8941100500019".into(),
            quantity: 2,
            adjustment_type: AdjustmentType::BillReduction,
            note: Some("Damaged in transit".into()),
        })
        .await?;
    println!("✓ Bill reduction on BILL-1001");

    let cash = db
        .sales()
        .checkout(CheckoutRequest {
            lines: vec![
                CartLine {
                    product: ProductRef::Barcode("8941100500026".into()),
                    quantity: 2,
                },
                CartLine {
                    product: ProductRef::Barcode("8941100700013".into()),
                    quantity: 5,
                },
            ],
            pricing: PricingAdjustments {
                vat: Rate::from_bps(500),
                discount: Discount::Fixed(Money::from_cents(1_000)),
                shipping: Money::zero(),
            },
            payment_method: PaymentMethod::Cash,
            customer: None,
            sold_at: None,
            staff_id: "seed".into(),
            amount_paid: None,
        })
        .await?;
    println!("✓ Cash sale {}", cash.sale.invoice_number);

    let due = db
        .sales()
        .checkout(CheckoutRequest {
            lines: vec![CartLine {
                product: ProductRef::Barcode("8941100600023".into()),
                quantity: 3,
            }],
            pricing: PricingAdjustments::default(),
            payment_method: PaymentMethod::Due,
            customer: Some(CustomerIdentity {
                name: "Rahim Uddin".into(),
                number: "01711000000".into(),
            }),
            sold_at: None,
            staff_id: "seed".into(),
            amount_paid: Some(Money::from_cents(50_000)),
        })
        .await?;
    println!("✓ Due sale {}", due.sale.invoice_number);

    db.customer_payments()
        .record_payment(CustomerPaymentRequest {
            customer_number: "01711000000".into(),
            allocations: vec![Allocation {
                sale_id: due.sale.id.clone(),
                amount: Money::from_cents(100_000),
                product_ids: due.items.iter().map(|item| item.product_id.clone()).collect(),
            }],
            method: PaymentMethod::MobileBanking,
            reference: None,
            paid_at: None,
        })
        .await?;

    let balance = db.customer_payments().customer_balance("01711000000").await?;
    info!(remaining = %balance.remaining, "Customer balance after seed");

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
