/// Weaviate vector store backend
///
/// Uses the REST API for schema, listing and batch writes, and GraphQL for
/// `nearVector` search. Vectors are supplied by us (`vectorizer: none`).
use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{CatalogueEntry, Embedding, StoredRecord, VectorRecord},
    services::providers::{upstream_error, VectorBackend},
};

const RETURNED_FIELDS: &str = "title summary content_rating plex_id";

/// Text properties of the class, name and description
const PROPERTIES: [(&str, &str); 4] = [
    ("title", "title of the video"),
    ("summary", "description of the video's plot"),
    ("content_rating", "audience content rating"),
    ("plex_id", "Plex GUID associated to the video"),
];

#[derive(Debug, Default, Serialize, Deserialize)]
struct VideoProperties {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    content_rating: String,
    #[serde(rename = "plex_id", default, skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
}

impl From<VideoProperties> for CatalogueEntry {
    fn from(props: VideoProperties) -> Self {
        CatalogueEntry {
            title: props.title,
            summary: props.summary,
            content_rating: props.content_rating,
            external_id: props.external_id.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeaviateObject {
    id: String,
    #[serde(default)]
    properties: VideoProperties,
}

#[derive(Debug, Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<WeaviateObject>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    objects: Vec<BatchObject<'a>>,
}

#[derive(Serialize)]
struct BatchObject<'a> {
    class: &'a str,
    properties: VideoProperties,
    vector: Embedding,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    #[serde(default)]
    result: Option<BatchResultStatus>,
}

#[derive(Debug, Deserialize)]
struct BatchResultStatus {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<ErrorMessage>>,
}

#[derive(Clone)]
pub struct WeaviateBackend {
    http_client: HttpClient,
    base_url: String,
    class_name: String,
}

impl WeaviateBackend {
    pub fn new(base_url: &str, class_name: &str, timeout: Duration) -> AppResult<Self> {
        let valid_class = class_name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
            && class_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_class {
            return Err(AppError::InvalidInput(format!(
                "Invalid Weaviate class name: {:?}",
                class_name
            )));
        }

        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            class_name: class_name.to_string(),
        })
    }

    fn class_definition(&self) -> Value {
        let properties: Vec<Value> = PROPERTIES
            .iter()
            .map(|(name, description)| property_definition(name, description))
            .collect();

        json!({
            "class": self.class_name,
            "description": "Vectorized library entries used for recommendation retrieval",
            "vectorizer": "none",
            "properties": properties,
        })
    }

    async fn add_property(&self, name: &str, description: &str) -> AppResult<()> {
        let url = format!("{}/v1/schema/{}/properties", self.base_url, self.class_name);
        let response = self
            .http_client
            .post(&url)
            .json(&property_definition(name, description))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Weaviate", response).await);
        }

        tracing::info!(class = %self.class_name, property = name, "Added missing Weaviate property");
        Ok(())
    }

    fn near_vector_query(&self, vector: &[f32], limit: usize) -> AppResult<String> {
        let vector = serde_json::to_string(vector)
            .map_err(|e| AppError::Internal(format!("Vector serialization error: {}", e)))?;
        Ok(format!(
            "{{ Get {{ {}(nearVector: {{vector: {}}}, limit: {}) {{ {} }} }} }}",
            self.class_name, vector, limit, RETURNED_FIELDS
        ))
    }

    fn parse_near_vector(&self, mut body: GraphQlResponse) -> AppResult<Vec<CatalogueEntry>> {
        if let Some(errors) = body.errors.take().filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(AppError::ExternalApi(format!(
                "Weaviate query failed: {}",
                messages.join("; ")
            )));
        }

        let hits = body
            .data
            .as_mut()
            .and_then(|data| data.get_mut("Get"))
            .and_then(|get| get.get_mut(self.class_name.as_str()))
            .map(Value::take)
            .unwrap_or(Value::Null);

        if hits.is_null() {
            return Ok(Vec::new());
        }

        let hits: Vec<VideoProperties> = serde_json::from_value(hits).map_err(|e| {
            AppError::ExternalApi(format!("Failed to parse Weaviate response: {}", e))
        })?;

        Ok(hits.into_iter().map(CatalogueEntry::from).collect())
    }
}

fn property_definition(name: &str, description: &str) -> Value {
    json!({ "name": name, "description": description, "dataType": ["text"] })
}

/// Properties this backend reads or writes that an existing class lacks
fn missing_properties(class: &Value) -> Vec<(&'static str, &'static str)> {
    let existing: Vec<&str> = class["properties"]
        .as_array()
        .map(|props| props.iter().filter_map(|p| p["name"].as_str()).collect())
        .unwrap_or_default();

    PROPERTIES
        .iter()
        .filter(|(name, _)| !existing.contains(name))
        .copied()
        .collect()
}

/// Element-wise mean of the query vectors, so several vectors become one search
pub(crate) fn combine_vectors(vectors: &[Embedding]) -> AppResult<Embedding> {
    let first = vectors
        .first()
        .ok_or_else(|| AppError::InvalidInput("No query vectors supplied".to_string()))?;
    if vectors.len() == 1 {
        return Ok(first.clone());
    }

    let dims = first.len();
    if let Some(mismatch) = vectors.iter().find(|v| v.len() != dims) {
        return Err(AppError::InvalidInput(format!(
            "Query vectors differ in width: {} vs {}",
            dims,
            mismatch.len()
        )));
    }

    let mut combined = vec![0.0f32; dims];
    for vector in vectors {
        for (acc, value) in combined.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    let count = vectors.len() as f32;
    combined.iter_mut().for_each(|v| *v /= count);

    Ok(combined)
}

#[async_trait::async_trait]
impl VectorBackend for WeaviateBackend {
    async fn ensure_collection(&self) -> AppResult<()> {
        let url = format!("{}/v1/schema/{}", self.base_url, self.class_name);
        let response = self.http_client.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(class = %self.class_name, "Weaviate class exists");
                let class: Value = response.json().await?;
                for (name, description) in missing_properties(&class) {
                    self.add_property(name, description).await?;
                }
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            _ => return Err(upstream_error("Weaviate", response).await),
        }

        tracing::info!(class = %self.class_name, "Weaviate class does not exist, creating");
        let url = format!("{}/v1/schema", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&self.class_definition())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Weaviate", response).await);
        }

        tracing::info!(class = %self.class_name, "Weaviate class created");
        Ok(())
    }

    async fn list_page(
        &self,
        after: Option<String>,
        limit: usize,
    ) -> AppResult<Vec<StoredRecord>> {
        let url = format!("{}/v1/objects", self.base_url);
        let mut query = vec![
            ("class", self.class_name.clone()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after));
        }

        let response = self.http_client.get(&url).query(&query).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("Weaviate", response).await);
        }

        let page: ObjectsResponse = response.json().await?;
        Ok(page
            .objects
            .into_iter()
            .map(|object| StoredRecord {
                id: object.id,
                title: object.properties.title,
                summary: object.properties.summary,
                content_rating: object.properties.content_rating,
                external_id: object.properties.external_id.filter(|id| !id.is_empty()),
            })
            .collect())
    }

    async fn insert_batch(&self, records: Vec<VectorRecord>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let objects: Vec<BatchObject> = records
            .into_iter()
            .map(|record| BatchObject {
                class: &self.class_name,
                properties: VideoProperties {
                    title: record.entry.title,
                    summary: record.entry.summary,
                    content_rating: record.entry.content_rating,
                    external_id: Some(record.entry.external_id).filter(|id| !id.is_empty()),
                },
                vector: record.vector,
            })
            .collect();

        let url = format!("{}/v1/batch/objects", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&BatchRequest { objects })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Weaviate", response).await);
        }

        let results: Vec<BatchResult> = response.json().await?;
        let errors = batch_errors(results);
        if !errors.is_empty() {
            return Err(AppError::ExternalApi(format!(
                "Weaviate batch insert failed: {}",
                errors.join("; ")
            )));
        }

        tracing::info!(count = count, class = %self.class_name, "Batch insert completed");
        Ok(())
    }

    async fn near_vectors(
        &self,
        vectors: Vec<Embedding>,
        limit: usize,
    ) -> AppResult<Vec<CatalogueEntry>> {
        if vectors.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.near_vector_query(&combine_vectors(&vectors)?, limit)?;
        let url = format!("{}/v1/graphql", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&GraphQlRequest { query: &query })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Weaviate", response).await);
        }

        let body: GraphQlResponse = response.json().await?;
        let hits = self.parse_near_vector(body)?;

        tracing::debug!(
            query_vectors = vectors.len(),
            hits = hits.len(),
            "Nearest neighbour query completed"
        );

        Ok(hits)
    }
}

fn batch_errors(results: Vec<BatchResult>) -> Vec<String> {
    results
        .into_iter()
        .filter_map(|r| r.result)
        .filter_map(|r| r.errors)
        .flat_map(|e| e.error)
        .map(|e| e.message)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_backend() -> WeaviateBackend {
        WeaviateBackend::new("http://weaviate:8080/", "Videos", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_class_name_validation() {
        assert!(WeaviateBackend::new("http://w", "videos", Duration::from_secs(1)).is_err());
        assert!(WeaviateBackend::new("http://w", "Videos) {", Duration::from_secs(1)).is_err());
        assert!(WeaviateBackend::new("http://w", "", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_class_definition() {
        let definition = create_test_backend().class_definition();
        assert_eq!(definition["class"], "Videos");
        assert_eq!(definition["vectorizer"], "none");
        let names: Vec<&str> = definition["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["title", "summary", "content_rating", "plex_id"]);
    }

    #[test]
    fn test_missing_properties_on_existing_class() {
        // Class created by an earlier deployment without the id property
        let class = json!({
            "class": "Videos",
            "properties": [
                {"name": "title", "dataType": ["text"]},
                {"name": "summary", "dataType": ["text"]},
                {"name": "content_rating", "dataType": ["text"]}
            ]
        });
        let missing: Vec<&str> = missing_properties(&class).iter().map(|(n, _)| *n).collect();
        assert_eq!(missing, vec!["plex_id"]);

        let complete = create_test_backend().class_definition();
        assert!(missing_properties(&complete).is_empty());
    }

    #[test]
    fn test_missing_properties_without_property_list() {
        let missing = missing_properties(&json!({"class": "Videos"}));
        assert_eq!(missing.len(), PROPERTIES.len());
    }

    #[test]
    fn test_stored_id_uses_plex_id_property() {
        let props = VideoProperties {
            title: "Ponyo".to_string(),
            external_id: Some("plex://1".to_string()),
            ..VideoProperties::default()
        };
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["plex_id"], "plex://1");
        assert!(json.get("external_id").is_none());
    }

    #[test]
    fn test_near_vector_query() {
        let query = create_test_backend()
            .near_vector_query(&[0.5, 0.25], 3)
            .unwrap();
        assert_eq!(
            query,
            "{ Get { Videos(nearVector: {vector: [0.5,0.25]}, limit: 3) { title summary content_rating plex_id } } }"
        );
    }

    #[test]
    fn test_combine_vectors_mean() {
        let combined = combine_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(combined, vec![0.5, 0.5]);
    }

    #[test]
    fn test_combine_vectors_rejects_mixed_widths() {
        assert!(combine_vectors(&[vec![1.0, 0.0], vec![1.0]]).is_err());
        assert!(combine_vectors(&[]).is_err());
    }

    #[test]
    fn test_parse_near_vector_hits() {
        let body: GraphQlResponse = serde_json::from_str(
            r#"{"data": {"Get": {"Videos": [
                {"title": "Ponyo", "summary": "A fish.", "content_rating": "G", "plex_id": "plex://1"},
                {"title": "Akira", "summary": "Neo-Tokyo.", "content_rating": "R", "plex_id": null}
            ]}}}"#,
        )
        .unwrap();

        let hits = create_test_backend().parse_near_vector(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Ponyo");
        assert_eq!(hits[0].external_id, "plex://1");
        assert_eq!(hits[1].external_id, "");
    }

    #[test]
    fn test_parse_near_vector_errors() {
        let body: GraphQlResponse = serde_json::from_str(
            r#"{"data": {"Get": {"Videos": null}}, "errors": [{"message": "vector lengths don't match"}]}"#,
        )
        .unwrap();

        let err = create_test_backend().parse_near_vector(body).unwrap_err();
        assert!(err.to_string().contains("vector lengths don't match"));
    }

    #[test]
    fn test_batch_errors_collected() {
        let results: Vec<BatchResult> = serde_json::from_str(
            r#"[
                {"id": "a", "result": {}},
                {"id": "b", "result": {"errors": {"error": [{"message": "bad vector"}]}}},
                {"id": "c"}
            ]"#,
        )
        .unwrap();

        assert_eq!(batch_errors(results), vec!["bad vector".to_string()]);
    }

    #[test]
    fn test_objects_page_deserialization() {
        let page: ObjectsResponse = serde_json::from_str(
            r#"{"objects": [{"id": "7f1c", "class": "Videos", "properties": {"title": "Ponyo", "summary": "A fish."}}], "totalResults": 1}"#,
        )
        .unwrap();

        assert_eq!(page.objects[0].id, "7f1c");
        assert_eq!(page.objects[0].properties.external_id, None);
    }
}
