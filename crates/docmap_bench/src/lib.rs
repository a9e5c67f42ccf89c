//! Benchmark utilities.

use docmap_core::{BulkWriter, DocRef};
use docmap_testkit::{Article, TestContext, CATEGORIES, STATUSES};
use std::sync::Arc;

/// Generate `count` articles spread evenly over categories and statuses.
pub fn generate_articles(count: usize) -> Vec<Article> {
    (0..count)
        .map(|i| {
            let mut article = Article::sample(
                &format!("a{i:07}"),
                CATEGORIES[i % CATEGORIES.len()],
                (i % 1_000) as i64,
            );
            article.status = STATUSES[i % STATUSES.len()].to_string();
            article
        })
        .collect()
}

/// A context holding `count` committed articles and an empty identity map.
pub fn seeded_context(count: usize) -> TestContext {
    let ctx = TestContext::new();
    BulkWriter::new(Arc::clone(&ctx.manager), 1_000)
        .persist_all(generate_articles(count).into_iter().map(DocRef::new))
        .expect("seeding the in-memory store succeeds");
    ctx.manager.clear();
    ctx
}
