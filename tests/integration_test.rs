// Integration tests for spacefold
use spacefold::prelude::*;
use spacefold::{ChunkingConfig, EntityStore};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine() -> Engine {
    init_tracing();
    let registry = EmbeddingRegistry::new().with_engine(Arc::new(HashingTextEngine::new(64)));
    Engine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), EngineConfig::default()).unwrap()
}

fn text(value: &str) -> FieldValue {
    FieldValue::String(value.to_string())
}

fn product_index() -> Index {
    Index::builder("products")
        .space(Space::text("description", "hashing", 64).bind("product", "description"))
        .space(
            Space::number("price", NumberEmbeddingConfig::new(0.0, 1000.0, NumberMode::Similar))
                .bind("product", "price"),
        )
        .schema(
            Schema::entity("product")
                .field("description", FieldType::String)
                .field("price", FieldType::Float)
                .nullable_field("brand", FieldType::String),
        )
        .build()
        .unwrap()
}

fn product(id: &str, description: &str, price: f64) -> Record {
    Record::new("product", id)
        .with_field("description", text(description))
        .with_field("price", FieldValue::Float(price))
}

#[tokio::test]
async fn test_multi_space_ingest_and_query() {
    let engine = engine();
    engine.add_index(product_index()).unwrap();
    let results = engine
        .ingest(
            "products",
            &[
                product("1", "trail running shoes", 90.0),
                product("2", "leather office chair", 450.0),
                product("3", "road running shoes", 120.0),
            ],
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.as_ref().unwrap().main_vector().unwrap().dim(), 67);
    }

    let query = Query::new("product")
        .similar("description", text("running shoes"))
        .space_weight("price", 0.0)
        .limit(2);
    let hits = engine.query("products", &query).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.entity.object_id != "2"));
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn test_looks_like_returns_itself_first() {
    let engine = engine();
    engine.add_index(product_index()).unwrap();
    engine
        .ingest(
            "products",
            &[product("1", "wool winter hat", 25.0), product("2", "ceramic coffee mug", 12.0)],
        )
        .await
        .unwrap();

    let hits = engine
        .query("products", &Query::new("product").looks_like("1"))
        .await
        .unwrap();
    assert_eq!(hits[0].entity.object_id, "1");
    assert!((hits[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_filters_and_radius() {
    let engine = engine();
    engine.add_index(product_index()).unwrap();
    engine
        .ingest(
            "products",
            &[
                product("1", "blue denim jacket", 80.0).with_field("brand", text("acme")),
                product("2", "blue denim jeans", 60.0).with_field("brand", text("other")),
            ],
        )
        .await
        .unwrap();

    let filtered = Query::new("product")
        .similar("description", text("blue denim"))
        .filter(ComparisonOperation::equal("brand", "other"))
        .select(["brand"]);
    let hits = engine.query("products", &filtered).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity.object_id, "2");
    assert_eq!(hits[0].fields.get("brand"), Some(&serde_json::json!("other")));

    let exact = Query::new("product").looks_like("1").radius(1e-4);
    let hits = engine.query("products", &exact).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_partial_update_reads_stored_fields() -> anyhow::Result<()> {
    let engine = engine();
    let index = engine.add_index(product_index())?;
    engine.ingest("products", &[product("1", "espresso machine", 300.0)]).await?;

    // price is not part of the update and comes from the stored object
    let update = Record::new("product", "1").with_field("description", text("espresso grinder"));
    let results = engine.ingest("products", &[update]).await?;
    let vector = results[0]
        .as_ref()
        .and_then(|r| r.main_vector())
        .ok_or_else(|| anyhow::anyhow!("no vector for product 1"))?;
    assert_eq!(vector.dim(), 67);

    let blob = engine
        .store()
        .read_object_blob(&EntityId::new("product", "1"))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no stored object"))?;
    assert_eq!(blob.get("description"), Some(&serde_json::json!("espresso grinder")));
    assert_eq!(blob.get("price"), Some(&serde_json::json!(300.0)));
    assert!(index.is_indexed("product"));
    Ok(())
}

#[tokio::test]
async fn test_query_binding_errors() {
    let engine = engine();
    engine.add_index(product_index()).unwrap();

    let unknown_space = Query::new("product").similar("color", text("red"));
    assert!(matches!(
        engine.query("products", &unknown_space).await,
        Err(Error::QueryBinding(_))
    ));

    let bad_weight = Query::new("product").space_weight("price", "high");
    assert!(matches!(
        engine.query("products", &bad_weight).await,
        Err(Error::QueryBinding(_))
    ));

    assert!(matches!(
        engine.query("missing", &Query::new("product")).await,
        Err(Error::NotFound(_))
    ));
}

fn feed_index() -> Index {
    let liked = Effect::new(
        "body",
        "interaction",
        SchemaReference::new("user", "user"),
        SchemaReference::new("paragraph", "paragraph"),
    )
    .with_filter(ComparisonOperation::equal("type", "like"));
    Index::builder("feed")
        .space(Space::text("body", "hashing", 64).bind("paragraph", "body"))
        .schema(Schema::entity("paragraph").field("body", FieldType::String))
        .schema(Schema::entity("user").nullable_field("name", FieldType::String))
        .schema(
            Schema::event("interaction")
                .reference("user", "user")
                .reference("paragraph", "paragraph")
                .field("type", FieldType::String),
        )
        .effect(liked)
        .build()
        .unwrap()
}

fn interaction(user: &str, paragraph: &str, kind: &str) -> EventRecord {
    EventRecord::new("interaction", NOW)
        .with_reference("user", user)
        .with_reference("paragraph", paragraph)
        .with_field("type", text(kind))
}

#[tokio::test]
async fn test_events_pull_user_towards_liked_paragraphs() {
    let engine = engine();
    engine.add_index(feed_index()).unwrap();
    let context = engine.context().with_now(NOW);
    engine
        .ingest_with_context(
            "feed",
            &[
                Record::new("paragraph", "p1").with_field("body", text("mountain hiking trails")),
                Record::new("paragraph", "p2").with_field("body", text("stock market analysis")),
                Record::new("user", "u1"),
            ],
            &context,
        )
        .await
        .unwrap();

    // a view does not match the like filter and leaves the user untouched
    let events = [interaction("u1", "p2", "view"), interaction("u1", "p1", "like")];
    let results = engine.ingest_events_with_context("feed", &events, &context).await.unwrap();
    assert_eq!(results.len(), 2);

    let query = Query::new("paragraph").looks_like_entity(EntityId::new("user", "u1"), 1.0);
    let hits = engine.query("feed", &query).await.unwrap();
    assert_eq!(hits[0].entity.object_id, "p1");
    assert!((hits[0].score - 1.0).abs() < 1e-4);

    let blob = engine
        .store()
        .read_object_blob(&events[1].entity_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blob.get("paragraph"), Some(&serde_json::json!("p1")));
}

#[tokio::test]
async fn test_chunk_hits_report_their_origin() {
    let engine = engine();
    engine
        .add_index(
            Index::builder("docs")
                .space(Space::text("body", "hashing", 64).bind_chunked("doc", "body", ChunkingConfig::new(40, 0)))
                .schema(Schema::entity("doc").field("body", FieldType::String))
                .build()
                .unwrap(),
        )
        .unwrap();
    let body = "Volcanoes erupt molten rock. Glaciers carve deep valleys. Rivers carry sediment downstream.";
    let results = engine
        .ingest("docs", &[Record::new("doc", "geo").with_field("body", text(body))])
        .await
        .unwrap();
    assert_eq!(results[0].as_ref().unwrap().chunks.len(), 3);

    let query = Query::new("doc").similar("body", text("Glaciers carve deep valleys.")).limit(1);
    let hits = engine.query("docs", &query).await.unwrap();
    assert_eq!(hits[0].entity.object_id, "geo-1");
    assert_eq!(hits[0].origin, Some(EntityId::new("doc", "geo")));
}

#[tokio::test]
async fn test_reingest_with_shorter_text_drops_old_chunks() {
    let engine = engine();
    engine
        .add_index(
            Index::builder("docs")
                .space(Space::text("body", "hashing", 64).bind_chunked("doc", "body", ChunkingConfig::new(20, 0)))
                .schema(Schema::entity("doc").field("body", FieldType::String))
                .build()
                .unwrap(),
        )
        .unwrap();
    let long = Record::new("doc", "d").with_field("body", text("one two three four five six seven eight nine ten"));
    engine.ingest("docs", &[long]).await.unwrap();
    engine
        .ingest("docs", &[Record::new("doc", "d").with_field("body", text("tiny"))])
        .await
        .unwrap();

    let query = Query::new("doc").similar("body", text("nine ten")).limit(10);
    let hits = engine.query("docs", &query).await.unwrap();
    let mut ids: Vec<&str> = hits.iter().map(|hit| hit.entity.object_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["d", "d-0"]);
}
