//! End-to-end toll reconciliation walkthrough

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use tollmatch_core::utils::MemoryStorage;
use tollmatch_core::{
    Invoice, InvoiceLine, InvoiceStatus, LineKind, TollKey, TollReconciler, TollStorage,
    TollTransaction, WeekConfig, WeekId,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🚚 Tollmatch Core - Reconciliation Walkthrough\n");

    // The planning calendar pins week 1 of 2025 to the ISO-aligned Monday
    let calendar = WeekConfig::new()
        .with_override(2025, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap())?;
    let mut storage = MemoryStorage::new();

    // 1. Week invoices as the invoicing team prepares them
    println!("📄 Preparing concept invoices...");
    let invoice = Invoice::new(
        "inv-2025-0311".to_string(),
        "Week 11 - 2025 (12-ABC-3)".to_string(),
        InvoiceStatus::Concept,
    );
    storage.save_invoice(&invoice).await?;
    println!("  ✓ {} - {}", invoice.id, invoice.reference);

    let second = Invoice::for_toll_week(
        "inv-2025-0312".to_string(),
        TollKey::new("12-ABC-3", WeekId::new(2025, 12)),
    );
    storage.save_invoice(&second).await?;
    let now = chrono::Utc::now().naive_utc();
    storage
        .save_line(&InvoiceLine {
            id: "line-seeded".to_string(),
            invoice_id: second.id.clone(),
            kind: LineKind::Toll,
            toll_date: NaiveDate::from_ymd_opt(2025, 3, 17),
            toll_country: Some("BE".to_string()),
            description: "Tol".to_string(),
            quantity: BigDecimal::from(0),
            unit_price: BigDecimal::from(0),
            vat_rate: 21,
            total: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        })
        .await?;
    println!("  ✓ {} - {} (with a toll placeholder)\n", second.id, second.reference);

    // 2. Charges as they arrive from the toll provider export
    println!("📥 Importing toll charges...");
    let charges = [
        ("t-001", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), "4.70", Some("BE")),
        ("t-002", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), "4.70", Some("BE")),
        ("t-003", NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(), "12.35", Some("FR")),
        ("t-004", NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(), "6.10", Some("BE")),
        ("t-005", NaiveDate::from_ymd_opt(2025, 3, 24).unwrap(), "3.80", None),
    ];
    for (id, day, amount, country) in charges {
        let txn = TollTransaction::new(
            id.to_string(),
            "12-ABC-3",
            day,
            None,
            BigDecimal::from_str(amount)?,
            21,
            country.map(|c| c.to_string()),
        );
        storage.save_transaction(&txn).await?;
        println!("  ✓ {} on {}: € {}", id, day, amount);
    }
    println!();

    // 3. Run the batch sweep over everything new
    println!("🔗 Running the reconciliation sweep...");
    let mut engine = TollReconciler::with_week_config(storage.clone(), calendar);
    let outcome = engine.reconcile_new_toll_transactions().await?;

    println!("  Processed:  {} transaction(s)", outcome.processed_transactions);
    println!("  Matched:    {} transaction(s)", outcome.matched_transactions.len());
    println!("  Lines:      {} created or updated", outcome.updated_invoice_lines.len());
    for unmatched in &outcome.unmatched_groups {
        println!(
            "  ⚠ Unmatched: {} on {} (€ {}): {}",
            unmatched.group.license_plate, unmatched.group.date, unmatched.group.total,
            unmatched.reason
        );
    }
    println!();

    // 4. Show what landed on the invoices
    for invoice_id in [invoice.id.as_str(), second.id.as_str()] {
        println!("📃 Lines on {}:", invoice_id);
        for line in storage.list_invoice_lines(invoice_id).await? {
            let label = line.description.replace('\n', " / ");
            println!(
                "  {} | qty {} x € {} | VAT {}%",
                label, line.quantity, line.unit_price, line.vat_rate
            );
        }
        println!();
    }

    // 5. The dashboard the back-office checks every morning
    println!("📊 Match-health dashboard...");
    let dashboard = engine
        .build_toll_dashboard_as_of(NaiveDate::from_ymd_opt(2025, 3, 25).unwrap(), None)
        .await?;

    println!("  Matched rows:   {}", dashboard.matched.len());
    for row in &dashboard.matched {
        println!(
            "    {} {} week {}: {} charge(s), € {}",
            row.license_plate, row.date, row.week, row.transaction_count, row.total
        );
    }
    println!("  Unmatched rows: {}", dashboard.unmatched.len());
    for row in &dashboard.unmatched {
        println!(
            "    {} {} (€ {}): {}",
            row.license_plate, row.date, row.total, row.message
        );
    }
    println!("  Missing toll:   {}", dashboard.missing_toll.len());
    println!("  Week overview:");
    for row in &dashboard.week_overview {
        println!(
            "    {} {} -> {}",
            row.week,
            row.license_plate,
            if row.ok { "✅ complete" } else { "❌ needs attention" }
        );
    }

    println!("\n🎉 Walkthrough completed successfully!");
    Ok(())
}
