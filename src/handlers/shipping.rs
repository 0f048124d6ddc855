//! Mock shipping rate calculation: deterministic pseudo-random rates
//! seeded by order id, so retries of the same order always diagnose the
//! same way.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ShippingRate {
    pub carrier: String,
    pub service: String,
    pub total_fee: f64,
    pub transit_days: u32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShippingResult {
    pub recommended_code: String,
    pub rates: Vec<ShippingRate>,
}

const CARRIERS: [(&str, &str, f64, u32); 4] = [
    ("FedEx", "Ground", 12.50, 3),
    ("UPS", "Ground", 15.20, 3),
    ("USPS", "Priority", 9.80, 5),
    ("DHL", "Express", 28.00, 1),
];

/// Rate each carrier with a ±10% fluctuation around its base fee, tag the
/// cheapest and fastest options, and recommend the cheapest.
pub fn calculate_rates(order_id: &str) -> ShippingResult {
    let mut rng = SeededRng::from_key(order_id);

    let mut rates: Vec<ShippingRate> = CARRIERS
        .iter()
        .map(|&(carrier, service, base_rate, transit_days)| {
            let fluctuation = base_rate * (rng.next_f64() - 0.5) * 0.2;
            ShippingRate {
                carrier: carrier.to_string(),
                service: service.to_string(),
                total_fee: round2(base_rate + fluctuation),
                transit_days,
                tags: Vec::new(),
            }
        })
        .collect();

    let cheapest = index_of_min(&rates, |r| r.total_fee);
    let fastest = index_of_min(&rates, |r| f64::from(r.transit_days));
    rates[cheapest].tags.push("CHEAPEST".to_string());
    rates[fastest].tags.push("FASTEST".to_string());

    let recommended_code = format!("{}_{}", rates[cheapest].carrier, rates[cheapest].service);
    ShippingResult {
        recommended_code,
        rates,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

fn index_of_min<F: Fn(&ShippingRate) -> f64>(rates: &[ShippingRate], key: F) -> usize {
    let mut min_idx = 0;
    for (i, rate) in rates.iter().enumerate() {
        if key(rate) < key(&rates[min_idx]) {
            min_idx = i;
        }
    }
    min_idx
}

/// xorshift64* generator seeded from an FNV-1a hash of the key.
struct SeededRng(u64);

impl SeededRng {
    fn from_key(key: &str) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Self(if hash == 0 { 1 } else { hash })
    }

    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        let bits = x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}
