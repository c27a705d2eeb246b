//! Embedded SQLite backend.
//!
//! Every collection lives in one `objects` table. Vectors are computed by the
//! configured [`Embedder`] from the collection's text properties and stored
//! next to the JSON properties. Similarity search is a linear scan scored
//! with Weaviate's certainty, `(1 + cosine) / 2`.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::embed::{cosine_similarity, Embedder};
use crate::error::StoreError;
use crate::query::{compare_values, project, FetchQuery, Filter, NearTextQuery, Properties, StoredObject};
use crate::schema::Collection;

pub struct LocalStore {
    db: Mutex<Connection>,
    embedder: Embedder,
}

struct Row {
    object: StoredObject,
    vector: Option<Vec<f32>>,
}

impl LocalStore {
    /// Open or create the database at `path`.
    pub fn open(path: &str, embedder: Embedder) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            db: Mutex::new(conn),
            embedder,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(embedder: Embedder) -> Result<Self, StoreError> {
        let store = Self {
            db: Mutex::new(Connection::open_in_memory()?),
            embedder,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let db = self.db.lock();
        db.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS objects (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                collection TEXT NOT NULL,
                properties TEXT NOT NULL,
                vector TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_objects_collection ON objects(collection);
            ",
        )?;
        Ok(())
    }

    /// Collections are implicit rows here; nothing to create.
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        tracing::debug!("Local store schema ready");
        Ok(())
    }

    async fn vectorize(
        &self,
        collection: Collection,
        properties: &Properties,
    ) -> Result<Option<String>, StoreError> {
        if !collection.vectorized() {
            return Ok(None);
        }
        let text = vector_text(collection, properties);
        let vector = self.embedder.embed_one(&text).await?;
        Ok(Some(serde_json::to_string(&vector)?))
    }

    pub async fn insert(
        &self,
        collection: Collection,
        properties: Properties,
        id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let vector = self.vectorize(collection, &properties).await?;
        let json = serde_json::to_string(&properties)?;

        let db = self.db.lock();
        db.execute(
            "INSERT INTO objects (id, collection, properties, vector) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), collection.class_name(), json, vector],
        )?;
        Ok(id)
    }

    pub async fn insert_many(
        &self,
        collection: Collection,
        objects: Vec<Properties>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let vectors: Vec<Option<String>> = if collection.vectorized() {
            let texts: Vec<String> = objects.iter().map(|p| vector_text(collection, p)).collect();
            self.embedder
                .embed(&texts)
                .await?
                .iter()
                .map(|v| serde_json::to_string(v).map(Some))
                .collect::<Result<_, _>>()?
        } else {
            vec![None; objects.len()]
        };

        let mut db = self.db.lock();
        let tx = db.transaction()?;
        let mut ids = Vec::with_capacity(objects.len());
        for (properties, vector) in objects.iter().zip(vectors) {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO objects (id, collection, properties, vector) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    collection.class_name(),
                    serde_json::to_string(properties)?,
                    vector
                ],
            )?;
            ids.push(id);
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn get(&self, collection: Collection, id: Uuid) -> Result<Option<StoredObject>, StoreError> {
        let db = self.db.lock();
        let json: Option<String> = db
            .query_row(
                "SELECT properties FROM objects WHERE collection = ?1 AND id = ?2",
                params![collection.class_name(), id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(StoredObject {
                id,
                properties: serde_json::from_str(&j)?,
                certainty: None,
            })),
            None => Ok(None),
        }
    }

    pub async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        properties: Properties,
    ) -> Result<(), StoreError> {
        let mut merged = self
            .get(collection, id)?
            .ok_or(StoreError::NotFound { collection, id })?
            .properties;
        merged.extend(properties);

        let vector = self.vectorize(collection, &merged).await?;
        let json = serde_json::to_string(&merged)?;
        let db = self.db.lock();
        let changed = db.execute(
            "UPDATE objects SET properties = ?1, vector = ?2 WHERE collection = ?3 AND id = ?4",
            params![json, vector, collection.class_name(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { collection, id });
        }
        Ok(())
    }

    pub fn delete(&self, collection: Collection, id: Uuid) -> Result<(), StoreError> {
        let db = self.db.lock();
        let changed = db.execute(
            "DELETE FROM objects WHERE collection = ?1 AND id = ?2",
            params![collection.class_name(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { collection, id });
        }
        Ok(())
    }

    pub fn fetch(
        &self,
        collection: Collection,
        query: &FetchQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let mut rows = self.load(collection, query.filter.as_ref())?;
        if let Some(ref sort) = query.sort {
            // Stable sort keeps insertion order for ties.
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.object.properties.get(&sort.property),
                    b.object.properties.get(&sort.property),
                );
                if sort.ascending { ord } else { ord.reverse() }
            });
        }
        Ok(rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit)
            .map(|r| StoredObject {
                properties: project(r.object.properties, &query.properties),
                ..r.object
            })
            .collect())
    }

    pub async fn near_text(
        &self,
        collection: Collection,
        query: &NearTextQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let target = self.embedder.embed_one(&query.query).await?;
        let min = query.certainty.unwrap_or(0.0);

        let mut scored: Vec<(f64, StoredObject)> = self
            .load(collection, query.filter.as_ref())?
            .into_iter()
            .filter_map(|r| {
                let vector = r.vector?;
                let certainty = (1.0 + f64::from(cosine_similarity(&target, &vector))) / 2.0;
                (certainty >= min).then_some((certainty, r.object))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit)
            .map(|(certainty, obj)| StoredObject {
                id: obj.id,
                properties: project(obj.properties, &query.properties),
                certainty: Some(certainty),
            })
            .collect())
    }

    pub fn count(&self, collection: Collection, filter: Option<&Filter>) -> Result<u64, StoreError> {
        Ok(self.load(collection, filter)?.len() as u64)
    }

    fn load(&self, collection: Collection, filter: Option<&Filter>) -> Result<Vec<Row>, StoreError> {
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT id, properties, vector FROM objects WHERE collection = ?1 ORDER BY seq ASC",
        )?;
        let raw = stmt
            .query_map(params![collection.class_name()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(db);

        let mut rows = Vec::with_capacity(raw.len());
        for (id, props, vector) in raw {
            let Ok(id) = Uuid::parse_str(&id) else {
                tracing::warn!(%id, "Skipping object with malformed id");
                continue;
            };
            let properties: Properties = serde_json::from_str(&props)?;
            if let Some(f) = filter
                && !f.matches(&id, &properties)
            {
                continue;
            }
            let vector = match vector {
                Some(v) => Some(serde_json::from_str(&v)?),
                None => None,
            };
            rows.push(Row {
                object: StoredObject {
                    id,
                    properties,
                    certainty: None,
                },
                vector,
            });
        }
        Ok(rows)
    }
}

/// Text the vectorizer sees: the collection's text properties joined by spaces.
fn vector_text(collection: Collection, properties: &Properties) -> String {
    collection
        .text_properties()
        .filter_map(|name| properties.get(name).and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::query::Sort;
    use serde_json::{json, Value};

    fn store() -> LocalStore {
        LocalStore::open_memory(Embedder::Hashing(HashingEmbedder::default())).unwrap()
    }

    fn props(v: Value) -> Properties {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_get_update_delete() {
        let s = store();
        let id = s
            .insert(Collection::Sections, props(json!({"title": "Impermanence", "order": 0})), None)
            .await
            .unwrap();

        let got = s.get(Collection::Sections, id).unwrap().unwrap();
        assert_eq!(got.str("title"), Some("Impermanence"));
        // Same id in another collection is not visible
        assert!(s.get(Collection::Agents, id).unwrap().is_none());

        s.update(Collection::Sections, id, props(json!({"order": 3})))
            .await
            .unwrap();
        let got = s.get(Collection::Sections, id).unwrap().unwrap();
        assert_eq!(got.properties["order"], json!(3));
        assert_eq!(got.str("title"), Some("Impermanence"));

        s.delete(Collection::Sections, id).unwrap();
        assert!(s.get(Collection::Sections, id).unwrap().is_none());
        assert!(matches!(
            s.delete(Collection::Sections, id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn caller_supplied_id_is_kept() {
        let s = store();
        let want = Uuid::new_v4();
        let got = s
            .insert(Collection::Users, props(json!({"email": "a@b.c"})), Some(want))
            .await
            .unwrap();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn fetch_filters_sorts_and_paginates() {
        let s = store();
        for (i, author) in ["a", "b", "a", "a"].iter().enumerate() {
            s.insert(
                Collection::Sections,
                props(json!({
                    "title": format!("t{i}"),
                    "author": author,
                    "created_at": format!("2024-01-0{}T00:00:00.000Z", i + 1),
                })),
                None,
            )
            .await
            .unwrap();
        }

        let q = FetchQuery::new(2)
            .with_filter(Filter::by_property("author", "a"))
            .with_sort(Sort::by_property("created_at", false))
            .with_properties(&["title"]);
        let page = s.fetch(Collection::Sections, &q).unwrap();
        let titles: Vec<_> = page.iter().map(|o| o.str("title").unwrap()).collect();
        assert_eq!(titles, vec!["t3", "t2"]);
        assert!(page[0].properties.get("author").is_none());

        let next = s.fetch(Collection::Sections, &q.clone().with_offset(2)).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].str("title"), Some("t0"));

        let total = s
            .count(Collection::Sections, Some(&Filter::by_property("author", "a")))
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn near_text_ranks_and_applies_certainty() {
        let s = store();
        let docs = vec![
            props(json!({"title": "refunds", "content": "How customers request refunds for orders"})),
            props(json!({"title": "dharma", "content": "The noble eightfold path and right mindfulness"})),
        ];
        let ids = s.insert_many(Collection::Documents, docs).await.unwrap();
        assert_eq!(ids.len(), 2);

        let q = NearTextQuery::new("noble eightfold path", 5);
        let hits = s.near_text(Collection::Documents, &q).await.unwrap();
        assert_eq!(hits[0].str("title"), Some("dharma"));
        assert!(hits[0].certainty.unwrap() > hits[1].certainty.unwrap());

        let strict = NearTextQuery::new("noble eightfold path", 5).with_certainty(0.99);
        let hits = s.near_text(Collection::Documents, &strict).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unvectorized_collections_never_match_near_text() {
        let s = store();
        s.insert(Collection::Users, props(json!({"email": "a@b.c", "name": "A"})), None)
            .await
            .unwrap();
        let hits = s
            .near_text(Collection::Users, &NearTextQuery::new("a@b.c", 5))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
