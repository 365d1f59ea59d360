use serde_json::{json, Value};

const CATALOG: &str = include_str!("fixtures/catalog.json");

/// Static listing served in mock mode or when every attempt failed.
pub fn catalog_json() -> &'static str {
    CATALOG
}

pub fn product_json(sku: &str) -> Option<Value> {
    let catalog: Value = serde_json::from_str(CATALOG).ok()?;
    let hit = catalog["hits"]
        .as_array()?
        .iter()
        .find(|hit| hit["sku"].as_str() == Some(sku))?;

    Some(json!({
        "product": {
            "sku": hit["sku"],
            "product_title": hit["name"],
            "brand": hit["brand"],
            "offer_code": hit["offer_code"],
            "price": hit["price"],
            "sale_price": hit["sale_price"],
            "image_keys": [hit["image_key"]],
            "product_rating": hit["product_rating"],
            "is_buyable": hit["is_buyable"],
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_fixture_shape() {
        let catalog: Value = serde_json::from_str(catalog_json()).unwrap();
        assert_eq!(catalog["hits"].as_array().unwrap().len(), 8);
        assert_eq!(catalog["nbPages"], 100);
        assert_eq!(catalog["nbHits"], 800);
    }

    #[test]
    fn test_product_fixture_lookup() {
        let product = product_json("N53582819F").unwrap();
        assert_eq!(product["product"]["brand"], "CONVERSE");
        assert!(product_json("UNKNOWN").is_none());
    }
}
