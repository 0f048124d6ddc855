//! Rule-based anomaly detection over the shipment payload.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResult {
    pub has_risk: bool,
    pub issues: Vec<AnomalyIssue>,
}

/// Run the fixed rule set: missing parcels is critical and short-circuits;
/// otherwise check total weight and per-item SKUs.
pub fn check_shipment(shipment: &Value) -> AnomalyResult {
    let mut issues = Vec::new();

    let parcels = match shipment.get("parcels").and_then(Value::as_array) {
        Some(parcels) if !parcels.is_empty() => parcels,
        _ => {
            issues.push(AnomalyIssue {
                kind: "MISSING_PARCELS".to_string(),
                level: "CRITICAL".to_string(),
                message: "Parcels information is missing".to_string(),
            });
            return AnomalyResult {
                has_risk: true,
                issues,
            };
        }
    };

    let total_weight: f64 = parcels
        .iter()
        .filter_map(|parcel| parcel.get("weight")?.get("value")?.as_f64())
        .sum();
    if total_weight > 10.0 {
        issues.push(AnomalyIssue {
            kind: "HEAVY_PACKAGE".to_string(),
            level: "WARNING".to_string(),
            message: format!("Total weight {total_weight:.2} kg may incur additional fees"),
        });
    }

    for (parcel_idx, parcel) in parcels.iter().enumerate() {
        let Some(items) = parcel.get("items").and_then(Value::as_array) else {
            continue;
        };
        for (item_idx, item) in items.iter().enumerate() {
            let sku = item.get("sku").and_then(Value::as_str).unwrap_or_default();
            if sku.is_empty() {
                issues.push(AnomalyIssue {
                    kind: "SKU_MISSING".to_string(),
                    level: "CRITICAL".to_string(),
                    message: format!(
                        "Item #{} in parcel #{} missing SKU",
                        item_idx + 1,
                        parcel_idx + 1
                    ),
                });
            }
        }
    }

    AnomalyResult {
        has_risk: !issues.is_empty(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_parcels_is_critical_and_short_circuits() {
        let result = check_shipment(&json!({"ship_from": {}, "ship_to": {}}));
        assert!(result.has_risk);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, "MISSING_PARCELS");
        assert_eq!(result.issues[0].level, "CRITICAL");
    }

    #[test]
    fn heavy_package_is_a_warning() {
        let shipment = json!({
            "parcels": [
                {"weight": {"value": 7.5}, "items": [{"sku": "A-1"}]},
                {"weight": {"value": 4.0}, "items": [{"sku": "B-2"}]}
            ]
        });
        let result = check_shipment(&shipment);
        assert!(result.has_risk);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, "HEAVY_PACKAGE");
        assert_eq!(result.issues[0].level, "WARNING");
    }

    #[test]
    fn missing_sku_is_flagged_per_item() {
        let shipment = json!({
            "parcels": [
                {"weight": {"value": 1.0}, "items": [{"sku": ""}, {"sku": "OK-1"}]}
            ]
        });
        let result = check_shipment(&shipment);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, "SKU_MISSING");
        assert!(result.issues[0].message.contains("Item #1 in parcel #1"));
    }

    #[test]
    fn clean_shipment_has_no_risk() {
        let shipment = json!({
            "parcels": [
                {"weight": {"value": 2.0}, "items": [{"sku": "SKU-1"}]}
            ]
        });
        let result = check_shipment(&shipment);
        assert!(!result.has_risk);
        assert!(result.issues.is_empty());
    }
}
