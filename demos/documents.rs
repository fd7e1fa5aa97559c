//! Submitting goods-introduction documents over HTTP.
//!
//! Documents are posted to `THROTTLE_ENDPOINT` if set, otherwise to the
//! default document route. The detached signature is read from
//! `DOCUMENT_SIGNATURE`.
//!
//! ```text
//! THROTTLE_ENDPOINT=http://localhost:8080/create DOCUMENT_SIGNATURE=... \
//!     cargo run --example documents
//! ```

use chrono::NaiveDate;
use std::time::Duration;
use submission_throttle::{
    default_routes, Description, DestinationResolver, Document, DocumentKind, GoodsIntroduction,
    HttpSender, Product, SubmissionThrottle, TimeUnit,
};
use tracing_subscriber::EnvFilter;

fn goods_introduction(doc_id: String) -> GoodsIntroduction {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
    GoodsIntroduction {
        description: Some(Description {
            participant_inn: "7700000000".to_string(),
        }),
        doc_id,
        doc_status: "DRAFT".to_string(),
        doc_type: DocumentKind::LpIntroduceGoods,
        import_request: false,
        owner_inn: "7700000000".to_string(),
        participant_inn: "7700000000".to_string(),
        producer_inn: "7711111111".to_string(),
        production_date: date,
        production_type: "OWN_PRODUCTION".to_string(),
        products: vec![Product {
            owner_inn: "7700000000".to_string(),
            producer_inn: "7711111111".to_string(),
            production_date: Some(date),
            tnved_code: "6401100000".to_string(),
            ..Product::default()
        }],
        reg_date: date,
        reg_number: "REG-1".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let routes = match std::env::var("THROTTLE_ENDPOINT") {
        Ok(url) => DestinationResolver::new([(DocumentKind::LpIntroduceGoods, url)])?,
        Err(_) => default_routes()?,
    };
    let signature = std::env::var("DOCUMENT_SIGNATURE").unwrap_or_else(|_| "unsigned".into());

    let throttle = SubmissionThrottle::<Document>::builder_per(TimeUnit::Second, 2)
        .with_routes(routes)
        .build(HttpSender::new(Duration::from_secs(30))?)?;

    for i in 0..5 {
        let document = Document::from(goods_introduction(format!("demo-{}", i)));
        throttle.submit(document, signature.clone())?;
    }

    while throttle.metrics().snapshot().pending() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    throttle.shutdown().await?;

    let snapshot = throttle.metrics().snapshot();
    println!(
        "delivered: {}, failed: {}, failure rate: {:.0}%",
        snapshot.delivered,
        snapshot.failed,
        snapshot.failure_rate() * 100.0
    );
    Ok(())
}
