//! Defensive mapping from platform API payloads to [`Item`]s.
//!
//! Both platforms reshuffle their response envelopes routinely, so nothing
//! here assumes a single schema: the item array is probed at several known
//! paths and each element is mapped field-by-field with fallbacks. An
//! unmappable element is skipped, never an error.

use serde_json::Value;

use crate::types::Item;

/// Known locations of the item array inside a search response.
const ARRAY_PATHS: &[&[&str]] = &[
    &["data", "items"],
    &["items"],
    &["data", "notes"],
    &["result", "data"],
    &["data", "resultList"],
];

/// Extract up to `top_n` items from a raw API payload. Empty output means
/// the payload held nothing mappable.
pub fn extract_items(payload: &Value, top_n: usize) -> Vec<Item> {
    let Some(array) = item_array(payload) else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(map_item)
        .take(top_n)
        .collect()
}

fn item_array(payload: &Value) -> Option<&Vec<Value>> {
    for path in ARRAY_PATHS {
        let mut cursor = payload;
        for segment in *path {
            cursor = cursor.get(segment)?;
        }
        if let Some(array) = cursor.as_array() {
            if !array.is_empty() {
                return Some(array);
            }
        }
    }
    None
}

fn map_item(raw: &Value) -> Option<Item> {
    // RedNote wraps the interesting fields in `note_card`; Goofish in
    // `item` or `data`. Unwrap one level if present.
    let core = raw
        .get("note_card")
        .or_else(|| raw.get("item"))
        .or_else(|| raw.get("data"))
        .unwrap_or(raw);

    let title = string_field(core, &["display_title", "title", "desc", "name"])?;
    if title.trim().is_empty() {
        return None;
    }

    let author = core
        .get("user")
        .and_then(|u| string_field(u, &["nickname", "nick_name", "nick", "name"]))
        .or_else(|| string_field(core, &["nick", "seller_nick"]));

    let engagement = core
        .get("interact_info")
        .map(|info| count_field(info, &["liked_count", "like_count"]))
        .filter(|n| *n > 0)
        .unwrap_or_else(|| count_field(core, &["liked_count", "want_count", "want_cnt", "likes"]));

    let price = string_field(core, &["price", "price_text", "sold_price"]);

    Some(Item {
        title: title.trim().to_string(),
        author,
        engagement,
        price,
    })
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    for name in names {
        match value.get(name) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn count_field(value: &Value, names: &[&str]) -> u64 {
    for name in names {
        if let Some(v) = value.get(name) {
            let parsed = parse_count(v);
            if parsed > 0 {
                return parsed;
            }
        }
    }
    0
}

/// Parse an engagement count that may arrive as a number, a digit string, or
/// a Chinese-abbreviated string like `"1.2万"`.
pub fn parse_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            if let Some(prefix) = s.strip_suffix('万') {
                (prefix.parse::<f64>().unwrap_or(0.0) * 10_000.0) as u64
            } else {
                s.parse::<f64>().map(|f| f as u64).unwrap_or(0)
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_rednote_note_cards() {
        let payload = json!({
            "data": {
                "items": [
                    {
                        "note_card": {
                            "display_title": "vintage camera haul",
                            "user": { "nickname": "film_girl" },
                            "interact_info": { "liked_count": "1.2万" }
                        }
                    },
                    { "note_card": { "display_title": "" } }
                ]
            }
        });
        let items = extract_items(&payload, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "vintage camera haul");
        assert_eq!(items[0].author.as_deref(), Some("film_girl"));
        assert_eq!(items[0].engagement, 12_000);
    }

    #[test]
    fn maps_goofish_listings_with_price() {
        let payload = json!({
            "result": {
                "data": [
                    {
                        "item": {
                            "title": "ns switch 续航版",
                            "nick": "seller88",
                            "want_cnt": 37,
                            "price": "620"
                        }
                    }
                ]
            }
        });
        let items = extract_items(&payload, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].engagement, 37);
        assert_eq!(items[0].price.as_deref(), Some("620"));
    }

    #[test]
    fn unknown_envelope_yields_empty() {
        let payload = json!({ "code": 0, "message": "ok" });
        assert!(extract_items(&payload, 10).is_empty());
    }

    #[test]
    fn top_n_is_respected() {
        let items: Vec<Value> = (0..30)
            .map(|i| json!({ "title": format!("item {i}"), "likes": i }))
            .collect();
        let payload = json!({ "items": items });
        assert_eq!(extract_items(&payload, 10).len(), 10);
    }

    #[test]
    fn count_parsing_handles_variants() {
        assert_eq!(parse_count(&json!(523)), 523);
        assert_eq!(parse_count(&json!("523")), 523);
        assert_eq!(parse_count(&json!("1,024")), 1024);
        assert_eq!(parse_count(&json!("3.5万")), 35_000);
        assert_eq!(parse_count(&json!(null)), 0);
    }
}
