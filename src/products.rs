// Products already present in the account, and PLU -> product id lookup.

use crate::error::Result;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// A product from the account listing. Only the id and the PLU matter
/// here; every other field of the remote document is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_plu")]
    pub plu: String,
}

/// PLUs are not always strings in the listing. Numbers keep their text,
/// null and anything else become "" and never match.
fn lenient_plu<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

impl Product {
    pub fn new(id: &str, plu: &str) -> Self {
        Product {
            id: id.to_string(),
            plu: plu.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub total: Option<u64>,
}

/// One page of the product listing: `{_items: [...], _meta: {...}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPage {
    #[serde(rename = "_items", default)]
    pub items: Vec<Product>,
    #[serde(rename = "_meta", default)]
    pub meta: PageMeta,
}

/// Progress after each page has been appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFetched {
    pub page: u32,
    pub total_pages: Option<u32>,
    pub items: usize,
    pub total_so_far: usize,
}

/// Request pages 1, 2, ... through `fetch` and concatenate them.
///
/// Stops on an empty page, a short page (fewer than `page_size` items),
/// or once the reported page reaches the reported page count.
pub fn collect_pages<F, P>(page_size: u32, mut fetch: F, mut on_page: P) -> Result<Vec<Product>>
where
    F: FnMut(u32) -> Result<ProductPage>,
    P: FnMut(&PageFetched),
{
    let mut products = Vec::new();
    let mut page = 1u32;

    loop {
        let ProductPage { items, meta } = fetch(page)?;
        if items.is_empty() {
            break;
        }

        let count = items.len();
        products.extend(items);
        on_page(&PageFetched {
            page: meta.page.unwrap_or(page),
            total_pages: meta.total_pages,
            items: count,
            total_so_far: products.len(),
        });

        let last_reported = matches!(
            (meta.page, meta.total_pages),
            (Some(current), Some(total)) if current >= total
        );
        if last_reported || count < page_size as usize {
            break;
        }
        page += 1;
    }

    Ok(products)
}

/// First product whose PLU equals `plu` exactly.
pub fn find_product_id_by_plu<'a>(products: &'a [Product], plu: &str) -> Option<&'a str> {
    if plu.is_empty() {
        return None;
    }
    products
        .iter()
        .find(|p| p.plu == plu)
        .map(|p| p.id.as_str())
}

/// Precomputed PLU lookup over a product listing.
///
/// When several products share a PLU the first one in listing order wins,
/// the same answer `find_product_id_by_plu` gives.
#[derive(Debug, Default)]
pub struct ProductIndex {
    by_plu: HashMap<String, String>,
    collisions: usize,
}

impl ProductIndex {
    pub fn new(products: &[Product]) -> Self {
        let mut by_plu: HashMap<String, String> = HashMap::with_capacity(products.len());
        let mut collisions = 0;
        for product in products.iter().filter(|p| !p.plu.is_empty()) {
            match by_plu.get(&product.plu) {
                Some(kept) => {
                    collisions += 1;
                    tracing::warn!(
                        plu = %product.plu,
                        kept = %kept,
                        ignored = %product.id,
                        "PLU shared by several products, using the first"
                    );
                }
                None => {
                    by_plu.insert(product.plu.clone(), product.id.clone());
                }
            }
        }
        ProductIndex { by_plu, collisions }
    }

    pub fn get(&self, plu: &str) -> Option<&str> {
        self.by_plu.get(plu).map(String::as_str)
    }

    /// Number of products ignored because an earlier one had the same PLU.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Map PLUs to product ids, dropping the ones without a match.
    /// Returns the ids in PLU order and the number of misses.
    pub fn resolve(&self, plus: &[String]) -> (Vec<String>, usize) {
        let ids: Vec<String> = plus
            .iter()
            .filter_map(|plu| self.get(plu))
            .map(str::to_string)
            .collect();
        let missing = plus.len() - ids.len();
        (ids, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;

    fn page(start: usize, len: usize, current: Option<u32>, total_pages: Option<u32>) -> ProductPage {
        ProductPage {
            items: (start..start + len)
                .map(|i| Product::new(&format!("id-{}", i), &format!("P{}", i)))
                .collect(),
            meta: PageMeta {
                page: current,
                total_pages,
                total: None,
            },
        }
    }

    #[test]
    fn short_last_page_ends_pagination() {
        let sizes = [500usize, 500, 120];
        let mut requested = Vec::new();
        let products = collect_pages(
            500,
            |n| {
                requested.push(n);
                let idx = (n - 1) as usize;
                Ok(page(idx * 500, sizes[idx], None, None))
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(products.len(), 1120);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[test]
    fn reported_page_count_ends_pagination() {
        let mut calls = 0;
        let mut progress = Vec::new();
        let products = collect_pages(
            2,
            |n| {
                calls += 1;
                Ok(page((n as usize - 1) * 2, 2, Some(n), Some(2)))
            },
            |p| progress.push(p.clone()),
        )
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(products.len(), 4);
        assert_eq!(
            progress.last(),
            Some(&PageFetched {
                page: 2,
                total_pages: Some(2),
                items: 2,
                total_so_far: 4
            })
        );
    }

    #[test]
    fn empty_page_ends_pagination() {
        let mut calls = 0;
        let products = collect_pages(
            2,
            |n| {
                calls += 1;
                Ok(if n == 1 { page(0, 2, None, None) } else { ProductPage::default() })
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(products.len(), 2);
    }

    #[test]
    fn page_error_propagates() {
        let err = collect_pages(
            10,
            |_| Err(ImportError::Transport("listing failed with status 502".into())),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Transport(_)));
    }

    #[test]
    fn page_deserializes_from_listing_json() {
        let json = r#"{"_items":[{"_id":"a1","plu":"P1","name":"Cola"},{"_id":"a2"}],
                       "_meta":{"page":1,"total_pages":3,"total":1001,"max_results":500}}"#;
        let page: ProductPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items, vec![Product::new("a1", "P1"), Product::new("a2", "")]);
        assert_eq!(page.meta.total_pages, Some(3));
        assert_eq!(page.meta.total, Some(1001));
    }

    #[test]
    fn odd_plu_values_do_not_break_the_page() {
        let json = r#"{"_items":[{"_id":"a1","plu":"P1"},{"_id":"a2","plu":null},
                                 {"_id":"a3","plu":1234},{"_id":"a4","plu":{"x":1}}],
                       "_meta":{"page":1,"total_pages":1}}"#;
        let page: ProductPage = serde_json::from_str(json).unwrap();
        assert_eq!(
            page.items,
            vec![
                Product::new("a1", "P1"),
                Product::new("a2", ""),
                Product::new("a3", "1234"),
                Product::new("a4", ""),
            ]
        );
        assert_eq!(find_product_id_by_plu(&page.items, "1234"), Some("a3"));
        assert_eq!(ProductIndex::new(&page.items).get(""), None);
    }

    #[test]
    fn lookup_by_plu() {
        let products = vec![Product::new("a1", "P1"), Product::new("a2", "P2"), Product::new("a3", "")];
        assert_eq!(find_product_id_by_plu(&products, "P2"), Some("a2"));
        assert_eq!(find_product_id_by_plu(&products, "P9"), None);
        assert_eq!(find_product_id_by_plu(&products, ""), None);
        assert_eq!(find_product_id_by_plu(&products, "p2"), None);
    }

    #[test]
    fn index_agrees_with_linear_scan_on_collisions() {
        let products = vec![
            Product::new("a1", "P1"),
            Product::new("a2", "P1"),
            Product::new("a3", "P3"),
        ];
        let index = ProductIndex::new(&products);
        assert_eq!(index.get("P1"), find_product_id_by_plu(&products, "P1"));
        assert_eq!(index.get("P1"), Some("a1"));
        assert_eq!(index.collisions(), 1);
    }

    #[test]
    fn resolve_drops_unknown_plus_and_keeps_repeats() {
        let index = ProductIndex::new(&[Product::new("a1", "P1"), Product::new("a2", "P2")]);
        let plus: Vec<String> = ["P2", "X", "P1", "P2"].iter().map(|s| s.to_string()).collect();
        let (ids, missing) = index.resolve(&plus);
        assert_eq!(ids, vec!["a2", "a1", "a2"]);
        assert_eq!(missing, 1);
    }
}
