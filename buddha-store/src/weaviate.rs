//! Weaviate backend over REST v1 and GraphQL.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::query::{FetchQuery, Filter, NearTextQuery, Properties, Sort, StoredObject};
use crate::schema::{Collection, DataType};

pub struct WeaviateStore {
    base_url: String,
    api_key: Option<String>,
    openai_key: Option<String>,
    embedding_model: String,
    http: reqwest::Client,
}

impl WeaviateStore {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        openai_key: Option<String>,
        embedding_model: &str,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            openai_key,
            embedding_model: embedding_model.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(ref key) = self.openai_key {
            req = req.header("X-OpenAI-Api-Key", key);
        }
        req
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %body, "Weaviate request failed");
        Err(StoreError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    async fn class_exists(&self, collection: Collection) -> Result<bool, StoreError> {
        let path = format!("/v1/schema/{}", collection.class_name());
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(resp).await?;
        Ok(true)
    }

    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            if self.class_exists(collection).await? {
                tracing::debug!(class = %collection, "Class already exists");
                continue;
            }
            let body = class_definition(collection, &self.embedding_model);
            let resp = self
                .request(reqwest::Method::POST, "/v1/schema")
                .json(&body)
                .send()
                .await?;
            Self::check(resp).await?;
            tracing::info!(class = %collection, "Created class");
        }
        Ok(())
    }

    pub async fn insert(
        &self,
        collection: Collection,
        properties: Properties,
        id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let resp = self
            .request(reqwest::Method::POST, "/v1/objects")
            .json(&json!({
                "class": collection.class_name(),
                "id": id,
                "properties": properties,
            }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(id)
    }

    pub async fn insert_many(
        &self,
        collection: Collection,
        objects: Vec<Properties>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = objects.iter().map(|_| Uuid::new_v4()).collect();
        let batch: Vec<Value> = ids
            .iter()
            .zip(objects)
            .map(|(id, properties)| {
                json!({
                    "class": collection.class_name(),
                    "id": id,
                    "properties": properties,
                })
            })
            .collect();

        let resp = self
            .request(reqwest::Method::POST, "/v1/batch/objects")
            .json(&json!({ "objects": batch }))
            .send()
            .await?;
        let results: Vec<Value> = Self::check(resp).await?.json().await?;
        let errors = batch_errors(&results);
        if let Some(first) = errors.first() {
            return Err(StoreError::Batch {
                failed: errors.len(),
                first: first.clone(),
            });
        }
        Ok(ids)
    }

    pub async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<StoredObject>, StoreError> {
        let path = format!("/v1/objects/{}/{id}", collection.class_name());
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::check(resp).await?.json().await?;
        let properties = body
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Some(StoredObject {
            id,
            properties,
            certainty: None,
        }))
    }

    pub async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        properties: Properties,
    ) -> Result<(), StoreError> {
        let path = format!("/v1/objects/{}/{id}", collection.class_name());
        let resp = self
            .request(reqwest::Method::PATCH, &path)
            .json(&json!({
                "class": collection.class_name(),
                "properties": properties,
            }))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound { collection, id });
        }
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), StoreError> {
        let path = format!("/v1/objects/{}/{id}", collection.class_name());
        let resp = self.request(reqwest::Method::DELETE, &path).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound { collection, id });
        }
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn fetch(
        &self,
        collection: Collection,
        query: &FetchQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let mut args = vec![format!("limit: {}", query.limit)];
        if let Some(offset) = query.offset {
            args.push(format!("offset: {offset}"));
        }
        if let Some(ref filter) = query.filter {
            args.push(format!("where: {}", render_where(collection, filter)));
        }
        if let Some(ref sort) = query.sort {
            args.push(format!("sort: {}", render_sort(sort)));
        }
        let gql = get_query(collection, &args, &query.properties, false);
        let data = self.graphql(&gql).await?;
        parse_get(&data, collection)
    }

    pub async fn near_text(
        &self,
        collection: Collection,
        query: &NearTextQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let mut near = format!("concepts: [{}]", serde_json::to_string(&query.query)?);
        if let Some(certainty) = query.certainty {
            near.push_str(&format!(", certainty: {certainty}"));
        }
        let mut args = vec![format!("nearText: {{{near}}}"), format!("limit: {}", query.limit)];
        if let Some(offset) = query.offset {
            args.push(format!("offset: {offset}"));
        }
        if let Some(ref filter) = query.filter {
            args.push(format!("where: {}", render_where(collection, filter)));
        }
        let gql = get_query(collection, &args, &query.properties, true);
        let data = self.graphql(&gql).await?;
        parse_get(&data, collection)
    }

    pub async fn count(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
    ) -> Result<u64, StoreError> {
        let args = match filter {
            Some(f) => format!("(where: {})", render_where(collection, f)),
            None => String::new(),
        };
        let gql = format!(
            "{{ Aggregate {{ {}{args} {{ meta {{ count }} }} }} }}",
            collection.class_name()
        );
        let data = self.graphql(&gql).await?;
        Ok(data
            .pointer(&format!("/Aggregate/{}/0/meta/count", collection.class_name()))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn graphql(&self, query: &str) -> Result<Value, StoreError> {
        tracing::trace!(%query, "GraphQL");
        let resp = self
            .request(reqwest::Method::POST, "/v1/graphql")
            .json(&json!({ "query": query }))
            .send()
            .await?;
        let mut body: Value = Self::check(resp).await?.json().await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let msg = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StoreError::GraphQl(msg));
        }
        Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }
}

fn class_definition(collection: Collection, embedding_model: &str) -> Value {
    let properties: Vec<Value> = collection
        .properties()
        .iter()
        .map(|p| json!({ "name": p.name, "dataType": [p.data_type.weaviate_name()] }))
        .collect();
    if collection.vectorized() {
        json!({
            "class": collection.class_name(),
            "vectorizer": "text2vec-openai",
            "moduleConfig": { "text2vec-openai": { "model": embedding_model } },
            "properties": properties,
        })
    } else {
        json!({
            "class": collection.class_name(),
            "vectorizer": "none",
            "properties": properties,
        })
    }
}

fn get_query(collection: Collection, args: &[String], wanted: &[String], certainty: bool) -> String {
    let fields = if wanted.is_empty() {
        collection
            .properties()
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        wanted.join(" ")
    };
    let additional = if certainty { "id certainty" } else { "id" };
    format!(
        "{{ Get {{ {}({}) {{ {fields} _additional {{ {additional} }} }} }} }}",
        collection.class_name(),
        args.join(", ")
    )
}

/// Render a filter as a GraphQL `where` argument. The value key follows the
/// property's schema type.
pub(crate) fn render_where(collection: Collection, filter: &Filter) -> String {
    match filter {
        Filter::Equal(name, value) => {
            let key = match collection.data_type(name) {
                Some(DataType::Int) => "valueInt",
                Some(DataType::Number) => "valueNumber",
                Some(DataType::Boolean) => "valueBoolean",
                Some(DataType::Date) => "valueDate",
                _ => "valueText",
            };
            format!(
                "{{operator: Equal, path: [{}], {key}: {}}}",
                quote(name),
                render_value(value)
            )
        }
        Filter::IdEqual(id) => format!(
            "{{operator: Equal, path: [\"id\"], valueText: {}}}",
            quote(&id.to_string())
        ),
        Filter::And(operands) => {
            let ops: Vec<String> = operands.iter().map(|f| render_where(collection, f)).collect();
            format!("{{operator: And, operands: [{}]}}", ops.join(", "))
        }
    }
}

fn render_sort(sort: &Sort) -> String {
    let order = if sort.ascending { "asc" } else { "desc" };
    format!("[{{path: [{}], order: {order}}}]", quote(&sort.property))
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// GraphQL input literal for a JSON value. Strings are JSON-escaped, which
/// GraphQL accepts.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => quote(s),
        other => other.to_string(),
    }
}

fn parse_get(data: &Value, collection: Collection) -> Result<Vec<StoredObject>, StoreError> {
    let Some(items) = data
        .pointer(&format!("/Get/{}", collection.class_name()))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else { continue };
        let additional = obj.get("_additional");
        let id = additional
            .and_then(|a| a.get("id"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| StoreError::GraphQl("result without _additional.id".to_string()))?;
        let certainty = additional
            .and_then(|a| a.get("certainty"))
            .and_then(Value::as_f64);
        let properties = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "_additional")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.push(StoredObject {
            id,
            properties,
            certainty,
        });
    }
    Ok(out)
}

fn batch_errors(results: &[Value]) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| r.pointer("/result/errors/error"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };

    #[test]
    fn where_uses_schema_value_type() {
        let f = Filter::by_property("author", "a@b.c").and(Filter::by_property("order", 2));
        assert_eq!(
            render_where(Collection::Sections, &f),
            "{operator: And, operands: [\
             {operator: Equal, path: [\"author\"], valueText: \"a@b.c\"}, \
             {operator: Equal, path: [\"order\"], valueInt: 2}]}"
        );
    }

    #[test]
    fn where_escapes_strings() {
        let f = Filter::by_property("title", "say \"hi\"");
        assert_eq!(
            render_where(Collection::Documents, &f),
            "{operator: Equal, path: [\"title\"], valueText: \"say \\\"hi\\\"\"}"
        );
    }

    #[test]
    fn sort_and_get_query() {
        assert_eq!(
            render_sort(&Sort::by_property("created_at", false)),
            "[{path: [\"created_at\"], order: desc}]"
        );
        let q = get_query(
            Collection::Messages,
            &["limit: 10".to_string()],
            &["content".to_string(), "role".to_string()],
            false,
        );
        assert_eq!(q, "{ Get { Messages(limit: 10) { content role _additional { id } } } }");
    }

    #[test]
    fn parse_get_reads_additional() {
        let id = Uuid::new_v4();
        let data = json!({
            "Get": { "Documents": [
                { "title": "t", "content": "c", "_additional": { "id": id.to_string(), "certainty": 0.93 } }
            ]}
        });
        let objs = parse_get(&data, Collection::Documents).unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].id, id);
        assert_eq!(objs[0].certainty, Some(0.93));
        assert!(objs[0].properties.get("_additional").is_none());
    }

    #[test]
    fn batch_errors_are_collected() {
        let results = vec![
            json!({ "result": {} }),
            json!({ "result": { "errors": { "error": [{ "message": "bad vector" }] } } }),
        ];
        assert_eq!(batch_errors(&results), vec!["bad vector".to_string()]);
    }

    #[test]
    fn credentials_class_has_no_vectorizer() {
        let def = class_definition(Collection::Users, "text-embedding-3-small");
        assert_eq!(def["vectorizer"], "none");
        let def = class_definition(Collection::Agents, "text-embedding-3-small");
        assert_eq!(def["moduleConfig"]["text2vec-openai"]["model"], "text-embedding-3-small");
    }

    async fn fake_batch(Json(body): Json<Value>) -> Json<Value> {
        let results: Vec<Value> = body["objects"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, obj)| {
                let mut result = json!({ "id": obj["id"], "result": {} });
                if i > 0 {
                    result["result"] = json!({ "errors": { "error": [{ "message": "vectorizer unavailable" }] } });
                }
                result
            })
            .collect();
        Json(Value::Array(results))
    }

    /// Aggregates count three, semantic searches find one passage, plain
    /// `Get` queries fail. Requests without the API key are refused.
    async fn fake_graphql(headers: HeaderMap, Json(body): Json<Value>) -> Response {
        let authorized = headers
            .get("authorization")
            .is_some_and(|v| v == "Bearer wv-key");
        if !authorized || headers.get("x-openai-api-key").is_none() {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let query = body["query"].as_str().unwrap_or_default();
        let reply = if query.contains("Aggregate") {
            json!({ "data": { "Aggregate": { "Documents": [{ "meta": { "count": 3 } }] } } })
        } else if query.contains("nearText") {
            json!({ "data": { "Get": { "Documents": [{
                "title": "kinh.pdf",
                "content": "Khổ đế",
                "_additional": { "id": "5f0c3f43-2f7e-4c7a-9d55-0c4d2b0f9d11", "certainty": 0.95 },
            }] } } })
        } else {
            json!({ "data": null, "errors": [{ "message": "no such class" }, { "message": "bad limit" }] })
        };
        Json(reply).into_response()
    }

    async fn fake_weaviate() -> WeaviateStore {
        let app = Router::new()
            .route(
                "/v1/objects/{class}/{id}",
                get(|| async { StatusCode::NOT_FOUND })
                    .patch(|| async { StatusCode::NOT_FOUND })
                    .delete(|| async { StatusCode::NOT_FOUND }),
            )
            .route("/v1/batch/objects", post(fake_batch))
            .route("/v1/graphql", post(fake_graphql));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        WeaviateStore::new(
            &format!("http://{addr}/"),
            Some("wv-key".into()),
            Some("sk-test".into()),
            "text-embedding-3-small",
        )
    }

    #[tokio::test]
    async fn missing_objects() {
        let store = fake_weaviate().await;
        let id = Uuid::new_v4();

        assert!(store.get(Collection::Documents, id).await.unwrap().is_none());

        let err = store
            .update(Collection::Agents, id, Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { collection: Collection::Agents, id: e } if e == id));

        let err = store.delete(Collection::Sections, id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { collection: Collection::Sections, .. }));
    }

    #[tokio::test]
    async fn batch_errors_fail_the_import() {
        let store = fake_weaviate().await;
        let mut props = Properties::new();
        props.insert("title".into(), json!("kinh.pdf"));

        let err = store
            .insert_many(Collection::Documents, vec![props.clone(), props.clone(), props])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Batch import failed for 2 objects, first error: vectorizer unavailable"
        );
    }

    #[tokio::test]
    async fn graphql_reads_and_errors() {
        let store = fake_weaviate().await;

        assert_eq!(store.count(Collection::Documents, None).await.unwrap(), 3);

        let hits = store
            .near_text(
                Collection::Documents,
                &NearTextQuery::new("khổ", 3).with_certainty(0.9),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].str("title"), Some("kinh.pdf"));
        assert_eq!(hits[0].certainty, Some(0.95));

        let err = store
            .fetch(Collection::Documents, &FetchQuery::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::GraphQl(ref msg) if msg == "no such class; bad limit"));
    }

    #[tokio::test]
    async fn upstream_failures_keep_status() {
        let store = fake_weaviate().await;
        let anonymous = WeaviateStore::new(&store.base_url, None, None, "m");
        let err = anonymous.count(Collection::Documents, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Upstream { status: 401, .. }));
    }
}
