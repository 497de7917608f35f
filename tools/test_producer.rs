//! Test Transaction Producer
//!
//! Publishes synthetic transactions to NATS for exercising the stream worker.
//!
//! Usage: test_producer [nats_url] [subject] [count] [fraud_rate] [delay_ms]

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use fraud_risk_scorer::types::{StreamTransaction, TransactionInput};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

const PAYMENT_METHODS: &[&str] = &[
    "UPI",
    "RTGS",
    "NEFT",
    "IMPS",
    "Debit_Card",
    "Credit_Card",
    "Net_Banking",
    "Mobile_Banking",
];

const MERCHANTS: &[&str] = &[
    "Grocery_Kirana",
    "Petrol_Pump",
    "Restaurant_Dhaba",
    "E_Commerce",
    "Mobile_Recharge",
    "Electricity_Bill",
    "Medical_Pharmacy",
    "Train_Booking",
];

const SUSPICIOUS_MERCHANTS: &[&str] = &["Gold_Jewellery", "Mutual_Fund", "Others"];

const LOCATIONS: &[&str] = &[
    "Mumbai", "Delhi", "Bangalore", "Chennai", "Kolkata", "Hyderabad", "Pune", "Jaipur",
];

const SUSPICIOUS_LOCATIONS: &[&str] = &[
    "International_Dubai",
    "International_Singapore",
    "International_USA",
    "Unknown_Location",
];

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
    epoch: NaiveDateTime,
}

impl TransactionGenerator {
    fn new() -> Self {
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
            epoch,
        }
    }

    fn next_id(&mut self) -> String {
        self.transaction_counter += 1;
        format!("tx_{:012}", self.transaction_counter)
    }

    /// Day-time transaction of everyday size
    fn generate_legitimate(&mut self) -> StreamTransaction {
        let hour = self.rng.gen_range(8..21);
        let time = self.time_at(hour);
        let amount = (self.rng.gen_range(50.0..25_000.0f64) * 100.0).round() / 100.0;
        let input = TransactionInput::new(amount)
            .with_payment_method(self.random_choice(PAYMENT_METHODS))
            .with_merchant_category(self.random_choice(MERCHANTS))
            .with_location(self.random_choice(LOCATIONS))
            .with_time(time);

        StreamTransaction {
            transaction_id: Some(self.next_id()),
            input,
        }
    }

    /// Large late-night transfer, often from abroad
    fn generate_suspicious(&mut self) -> StreamTransaction {
        let hour = if self.rng.gen_bool(0.5) {
            self.rng.gen_range(0..5)
        } else {
            self.rng.gen_range(22..24)
        };
        let time = self.time_at(hour);
        let location = if self.rng.gen_bool(0.6) {
            self.random_choice(SUSPICIOUS_LOCATIONS)
        } else {
            self.random_choice(LOCATIONS)
        };
        let amount = self.rng.gen_range(100_000.0..1_000_000.0f64).round();
        let input = TransactionInput::new(amount)
            .with_payment_method(self.random_choice(&["NEFT", "RTGS", "IMPS"]))
            .with_merchant_category(self.random_choice(SUSPICIOUS_MERCHANTS))
            .with_location(location)
            .with_time(time);

        StreamTransaction {
            transaction_id: Some(self.next_id()),
            input,
        }
    }

    /// ISO-8601 timestamp on a random day of 2024 at the given hour
    fn time_at(&mut self, hour: i64) -> String {
        let offset = ChronoDuration::days(self.rng.gen_range(0..366))
            + ChronoDuration::hours(hour)
            + ChronoDuration::minutes(self.rng.gen_range(0..60));
        (self.epoch + offset).format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transaction Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            Some(c)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            None
        }
    };

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();
    let mut legitimate_count = 0;
    let mut suspicious_count = 0;

    for i in 0..count {
        let transaction = if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            legitimate_count += 1;
            generator.generate_legitimate()
        };

        match &client {
            Some(client) => {
                let payload = serde_json::to_vec(&transaction)?;
                client.publish(subject.to_string(), payload.into()).await?;
            }
            None if (i + 1) % 10 == 0 || i == 0 => {
                info!(
                    "Sample transaction {}:\n{}",
                    i + 1,
                    serde_json::to_string_pretty(&transaction)?
                );
            }
            None => {}
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} transactions ({} legitimate, {} suspicious)",
                i + 1,
                count,
                legitimate_count,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    if let Some(client) = client {
        client.flush().await?;
    }

    info!(
        "Completed! {} transactions ({} legitimate, {} suspicious)",
        count, legitimate_count, suspicious_count
    );

    Ok(())
}
