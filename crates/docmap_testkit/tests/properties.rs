//! Property tests over generated documents.

use docmap_core::{Criteria, DocRef, Value};
use docmap_store::ClientAdapter;
use docmap_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn matches(article: &Article, criteria: &Criteria) -> bool {
    criteria.iter().all(|(field, expected)| match field {
        "category" => *expected == Value::from(article.category.as_str()),
        "status" => *expected == Value::from(article.status.as_str()),
        "featured" => *expected == Value::from(article.featured),
        other => panic!("unexpected field {other}"),
    })
}

fn store(ctx: &TestContext, articles: &[Article]) {
    for article in articles {
        ctx.manager.persist(&DocRef::new(article.clone())).unwrap();
    }
    ctx.manager.commit().unwrap();
    ctx.manager.clear();
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn articles_survive_a_round_trip(articles in articles_strategy(16)) {
        let ctx = TestContext::new();
        store(&ctx, &articles);

        let repo = ctx.repository::<Article>();
        for article in &articles {
            let id = article.id.as_deref().unwrap();
            let found = repo.find(id).unwrap();
            prop_assert!(found.is_some(), "missing {}", id);
            let found = found.unwrap();
            let guard = found.read();
            prop_assert_eq!(&*guard, article);
        }
        prop_assert_eq!(repo.count().unwrap(), articles.len());
    }

    #[test]
    fn events_survive_a_json_round_trip(event in event_strategy()) {
        let ctx = TestContext::new();
        let doc = DocRef::new(event);
        ctx.manager.persist(&doc).unwrap();
        ctx.manager.commit().unwrap();
        let expected = doc.read().clone();
        ctx.manager.clear();

        let id = expected.id.clone().unwrap();
        let found = ctx.repository::<Event>().find(&id).unwrap().unwrap();
        let guard = found.read();
        prop_assert_eq!(&*guard, &expected);
    }

    #[test]
    fn indexes_mirror_field_values(
        articles in articles_strategy(16),
        updates in prop::collection::vec((0usize..16, prop::sample::select(CATEGORIES.to_vec()), -50i64..50), 0..8),
    ) {
        let ctx = TestContext::new();
        store(&ctx, &articles);

        let mut expected = articles.clone();
        let repo = ctx.repository::<Article>();
        for (slot, category, score) in updates {
            if expected.is_empty() {
                break;
            }
            let slot = slot % expected.len();
            let id = expected[slot].id.clone().unwrap();
            let doc = repo.find(&id).unwrap().unwrap();
            {
                let mut article = doc.write();
                article.category = category.to_string();
                article.score = score;
            }
            ctx.manager.persist(&doc).unwrap();
            ctx.manager.commit().unwrap();
            expected[slot].category = category.to_string();
            expected[slot].score = score;
        }

        for category in CATEGORIES {
            let members: BTreeSet<String> = ctx
                .adapter
                .smembers(&format!("idx:articles:category:{category}"))
                .unwrap()
                .into_iter()
                .collect();
            let wanted: BTreeSet<String> = expected
                .iter()
                .filter(|a| a.category == category)
                .filter_map(|a| a.id.clone())
                .collect();
            prop_assert_eq!(members, wanted);
        }
        prop_assert_eq!(
            ctx.adapter.zcard("zidx:articles:score").unwrap(),
            expected.len()
        );
        for article in &expected {
            let score = article.score as f64;
            let members = ctx
                .adapter
                .zrange_by_score(
                    "zidx:articles:score",
                    docmap_store::ScoreBound::Inclusive(score),
                    docmap_store::ScoreBound::Inclusive(score),
                    None,
                )
                .unwrap();
            prop_assert!(members.contains(article.id.as_ref().unwrap()));
        }
    }

    #[test]
    fn queries_agree_with_a_brute_force_filter(
        articles in articles_strategy(24),
        criteria in article_criteria_strategy(),
    ) {
        let ctx = TestContext::new();
        store(&ctx, &articles);

        let found: BTreeSet<String> = ctx
            .repository::<Article>()
            .find_by(&criteria, &[], None, 0)
            .unwrap()
            .ids()
            .iter()
            .cloned()
            .collect();
        let wanted: BTreeSet<String> = articles
            .iter()
            .filter(|a| matches(a, &criteria))
            .filter_map(|a| a.id.clone())
            .collect();

        prop_assert_eq!(found, wanted);
    }

    #[test]
    fn ranges_agree_with_a_brute_force_filter(
        articles in articles_strategy(24),
        low in -1_000i64..1_000,
        span in 0i64..1_000,
    ) {
        let ctx = TestContext::new();
        store(&ctx, &articles);
        let high = low + span;

        let page = ctx
            .repository::<Article>()
            .range("score")
            .unwrap()
            .min(low, true)
            .max(high, false)
            .execute()
            .unwrap();
        let found: BTreeSet<String> = page.ids().iter().cloned().collect();
        let wanted: BTreeSet<String> = articles
            .iter()
            .filter(|a| a.score >= low && a.score < high)
            .filter_map(|a| a.id.clone())
            .collect();

        prop_assert_eq!(page.total(), wanted.len());
        prop_assert_eq!(found, wanted);
    }
}
