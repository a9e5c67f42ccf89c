//! Cursor-scan helpers.

use crate::error::CoreResult;
use docmap_store::ClientAdapter;

/// Walks every key matching `pattern`, one bounded step at a time.
///
/// `visit` receives each non-empty step. Keys may repeat across steps on
/// stores that rehash mid-iteration.
pub(crate) fn scan_pages<F>(
    adapter: &dyn ClientAdapter,
    pattern: &str,
    count: usize,
    mut visit: F,
) -> CoreResult<()>
where
    F: FnMut(Vec<String>) -> CoreResult<()>,
{
    let mut cursor = 0;
    loop {
        let page = adapter.scan(cursor, pattern, count.max(1))?;
        cursor = page.cursor;
        if !page.keys.is_empty() {
            visit(page.keys)?;
        }
        if cursor == 0 {
            return Ok(());
        }
    }
}

/// Collects every key matching `pattern`, sorted and deduplicated.
pub(crate) fn scan_keys(
    adapter: &dyn ClientAdapter,
    pattern: &str,
    count: usize,
) -> CoreResult<Vec<String>> {
    let mut keys = Vec::new();
    scan_pages(adapter, pattern, count, |page| {
        keys.extend(page);
        Ok(())
    })?;
    keys.sort_unstable();
    keys.dedup();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_store::InMemoryAdapter;

    #[test]
    fn scans_in_bounded_steps() {
        let store = InMemoryAdapter::new();
        for i in 0..25 {
            store.set(&format!("c:{i:02}"), "x").unwrap();
        }
        store.set("other:1", "x").unwrap();

        let keys = scan_keys(&store, "c:*", 10).unwrap();
        assert_eq!(keys.len(), 25);
        assert_eq!(keys[0], "c:00");
        assert!(store.stats().scans >= 3);
    }

    #[test]
    fn visitor_errors_stop_the_scan() {
        let store = InMemoryAdapter::new();
        for i in 0..5 {
            store.set(&format!("k:{i}"), "x").unwrap();
        }
        let mut steps = 0;
        let result = scan_pages(&store, "k:*", 1, |_| {
            steps += 1;
            Err(crate::CoreError::invalid_query("stop"))
        });
        assert!(result.is_err());
        assert_eq!(steps, 1);
    }
}
