//! Scroll reads, structural reads and index discovery.

use esdump_core::{Error, ErrorKind, Record, Result, TransferType, Unit, format_duration};
use esdump_reqwest::Method;
use serde_json::{Value, json};

use super::{ElasticsearchTransport, TRACING_TARGET};
use crate::core::{Page, ReadContext, RecordFailure};

/// Rejections of a read request are configuration problems on the input
/// side, not destination failures.
pub(super) fn read_error(err: Error) -> Error {
    if err.kind() != ErrorKind::DestinationRejected {
        return err;
    }
    let message = err.message.clone().unwrap_or_default();
    Error::configuration_invalid()
        .with_message(format!("input rejected the read request: {message}"))
        .with_source(err)
}

/// Builds the body of the first search of a read.
///
/// The filter may be a bare query or a full search body. `from` is only
/// set for windowed reads, which do not open a scroll.
fn search_body(ctx: &ReadContext) -> Value {
    let mut body = match &ctx.filter {
        Some(Value::Object(map)) if map.contains_key("query") => Value::Object(map.clone()),
        Some(query) => json!({ "query": query }),
        None => json!({ "query": { "match_all": {} } }),
    };

    if let Value::Object(map) = &mut body {
        map.insert("size".into(), json!(ctx.limit));
        if ctx.skip > 0 {
            map.insert("from".into(), json!(ctx.skip));
        }
        map.entry("sort").or_insert_with(|| json!(["_doc"]));
    }
    body
}

/// Path suffix of the structural GET for a transfer type.
fn structure_endpoint(kind: TransferType) -> &'static str {
    match kind {
        TransferType::Mapping => "_mapping",
        TransferType::Analyzer => "_settings",
        TransferType::Alias => "_alias",
        TransferType::Template => "_template",
        TransferType::Data => "_search",
    }
}

impl ElasticsearchTransport {
    /// Opens or continues a scroll.
    ///
    /// A read that skips records is a plain `from`/`size` search without a
    /// scroll, since stores reject `from` in a scroll context. Its page
    /// carries no cursor and the next window is requested with a new skip.
    pub(super) async fn fetch_documents(&self, ctx: &ReadContext) -> Result<Page> {
        let lease = format_duration(ctx.lease);
        let windowed = ctx.cursor().is_none() && ctx.skip > 0;

        let mut body = match ctx.cursor() {
            None => {
                let container = self.read_container(ctx);
                let mut segments: Vec<&str> = Vec::with_capacity(3);
                if let Some(container) = container {
                    segments.push(&container.index);
                    if let Some(subtype) = &container.subtype {
                        segments.push(subtype);
                    }
                }
                segments.push("_search");

                let mut url = self.endpoint(&segments)?;
                if !windowed {
                    url.query_pairs_mut().append_pair("scroll", &lease);
                }

                tracing::debug!(
                    target: TRACING_TARGET,
                    container = %container.map(|c| c.path()).unwrap_or_default(),
                    skip = ctx.skip,
                    limit = ctx.limit,
                    filtered = ctx.filter.is_some(),
                    windowed,
                    "Starting search"
                );
                self.send_checked(Method::POST, url, Some(&search_body(ctx)))
                    .await?
            }
            Some(token) => {
                let url = self.endpoint(&["_search", "scroll"])?;
                let body = json!({ "scroll": lease, "scroll_id": token });
                self.send_checked(Method::POST, url, Some(&body)).await?
            }
        };

        let cursor = body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let hits = match body.pointer_mut("/hits/hits").map(Value::take) {
            Some(Value::Array(hits)) => hits,
            _ => {
                return Err(Error::source_unavailable()
                    .with_message("search response without hits.hits"));
            }
        };

        let fetched = hits.len();
        let mut units = Vec::with_capacity(fetched);
        let mut failures = Vec::new();
        for hit in hits {
            let label = match hit.get("_id") {
                Some(Value::String(id)) => id.clone(),
                Some(id) => id.to_string(),
                None => "<no _id>".to_owned(),
            };
            match Record::from_envelope(hit) {
                Ok(record) => units.push(Unit::Document(record)),
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        id = %label,
                        error = %err,
                        "Skipping undecodable hit"
                    );
                    failures.push(RecordFailure::new(label, &err));
                }
            }
        }

        let exhausted = fetched < ctx.limit || (!windowed && cursor.is_none());
        tracing::debug!(
            target: TRACING_TARGET,
            batch_size = fetched,
            exhausted,
            "Fetched scroll page"
        );

        Ok(Page {
            units,
            failures,
            cursor,
            exhausted,
        })
    }

    /// Reads one structural definition per container.
    pub(super) async fn fetch_structures(&self, ctx: &ReadContext) -> Result<Page> {
        let index = self.read_container(ctx).map(|c| c.index.as_str());
        let suffix = structure_endpoint(ctx.kind);

        let url = match (ctx.kind, index) {
            (TransferType::Template, Some(name)) => self.endpoint(&[suffix, name])?,
            (_, Some(index)) => self.endpoint(&[index, suffix])?,
            (_, None) => self.endpoint(&[suffix])?,
        };

        let body = self.send_checked(Method::GET, url, None).await?;
        let units = Unit::decode(ctx.kind, body)?;

        tracing::debug!(
            target: TRACING_TARGET,
            kind = %ctx.kind,
            containers = units.len(),
            "Fetched structures"
        );
        Ok(Page::last(units))
    }

    /// Releases a scroll context. A context that already expired is not an
    /// error.
    pub(super) async fn clear_scroll(&self, token: &str) -> Result<()> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let body = json!({ "scroll_id": [token] });
        let response = self.send(Method::DELETE, url, Some(&body)).await?;

        if !response.is_success() && response.status.as_u16() != 404 {
            response.error_for_status()?;
        }
        tracing::debug!(target: TRACING_TARGET, "Cleared scroll");
        Ok(())
    }

    /// Lists index names, excluding hidden (dot-prefixed) indices.
    pub(super) async fn list_indices(&self) -> Result<Vec<String>> {
        let mut url = self.endpoint(&["_cat", "indices"])?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("h", "index");

        let body = self.send_checked(Method::GET, url, None).await?;
        let Value::Array(rows) = body else {
            return Err(Error::source_unavailable().with_message("unexpected _cat/indices response"));
        };

        let mut names: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("index").and_then(Value::as_str))
            .filter(|name| !name.starts_with('.'))
            .map(str::to_owned)
            .collect();
        names.sort();
        names.dedup();

        tracing::debug!(target: TRACING_TARGET, count = names.len(), "Discovered indices");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use esdump_core::ContainerRef;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::core::Transport;
    use crate::provider::elasticsearch::tests::transport;

    fn hit(id: u64) -> Value {
        json!({
            "_index": "source_index",
            "_type": "seeds",
            "_id": id.to_string(),
            "_score": 1.0,
            "_source": {"key": format!("key{id}"), "_uuid": id}
        })
    }

    #[test]
    fn test_search_body() {
        let ctx = ReadContext::new(TransferType::Data, 100).with_skip(250);
        assert_eq!(
            search_body(&ctx),
            json!({"query": {"match_all": {}}, "size": 100, "from": 250, "sort": ["_doc"]})
        );

        let ctx = ReadContext::new(TransferType::Data, 10)
            .with_filter(Some(json!({"query": {"term": {"key": "key1"}}})));
        assert_eq!(search_body(&ctx)["query"], json!({"term": {"key": "key1"}}));

        let ctx = ReadContext::new(TransferType::Data, 10)
            .with_filter(Some(json!({"range": {"_uuid": {"lte": "2"}}})));
        assert_eq!(search_body(&ctx)["query"]["range"]["_uuid"]["lte"], "2");
        assert!(search_body(&ctx).get("from").is_none());
    }

    #[tokio::test]
    async fn test_scroll_open_and_continue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/source_index/seeds/_search"))
            .and(query_param("scroll", "10m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "scroll-1",
                "hits": {"hits": [hit(0), hit(1)]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .and(body_json(json!({"scroll": "10m", "scroll_id": "scroll-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "scroll-1",
                "hits": {"hits": [hit(2)]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let es = transport(&server.uri(), Some("source_index/seeds"));
        let ctx = ReadContext::new(TransferType::Data, 2).with_lease(Duration::from_secs(600));

        let first = es.fetch(&ctx).await.unwrap();
        assert_eq!(first.units.len(), 2);
        assert!(!first.exhausted);
        let record = first.units[0].record().unwrap();
        assert_eq!(record.container, ContainerRef::new("source_index").with_subtype("seeds"));

        let second = es
            .fetch(&ctx.clone().with_cursor(first.cursor.unwrap()))
            .await
            .unwrap();
        assert_eq!(second.units.len(), 1);
        assert!(second.exhausted);
    }

    #[tokio::test]
    async fn test_skip_uses_plain_search_without_scroll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/source_index/_search"))
            .and(query_param_is_missing("scroll"))
            .and(body_json(json!({
                "query": {"match_all": {}}, "size": 2, "from": 250, "sort": ["_doc"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [hit(250), hit(251)]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/source_index/_search"))
            .and(query_param_is_missing("scroll"))
            .and(body_json(json!({
                "query": {"match_all": {}}, "size": 2, "from": 252, "sort": ["_doc"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [hit(252)]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let es = transport(&server.uri(), Some("source_index"));
        let ctx = ReadContext::new(TransferType::Data, 2);

        let first = es.fetch(&ctx.clone().with_skip(250)).await.unwrap();
        assert_eq!(first.units.len(), 2);
        assert!(first.cursor.is_none());
        assert!(!first.exhausted);

        let second = es.fetch(&ctx.with_skip(252)).await.unwrap();
        assert_eq!(second.units.len(), 1);
        assert!(second.exhausted);
    }

    #[tokio::test]
    async fn test_expired_scroll_maps_to_cursor_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "search_context_missing_exception", "reason": "No search context found for id [1]"},
                "status": 404
            })))
            .mount(&server)
            .await;

        let es = transport(&server.uri(), Some("source_index"));
        let ctx = ReadContext::new(TransferType::Data, 10).with_cursor("stale");
        let err = es.fetch(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CursorExpired);
    }

    #[tokio::test]
    async fn test_missing_input_index_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/missing_index/_search"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "index_not_found_exception"},
                "status": 404
            })))
            .mount(&server)
            .await;

        let es = transport(&server.uri(), Some("missing_index"));
        let err = es
            .fetch(&ReadContext::new(TransferType::Data, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
    }

    #[tokio::test]
    async fn test_fetch_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/source_index/_mapping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "source_index": {"mappings": {"properties": {"key": {"type": "keyword"}}}}
            })))
            .mount(&server)
            .await;

        let es = transport(&server.uri(), Some("source_index"));
        let page = es
            .fetch(&ReadContext::new(TransferType::Mapping, 100))
            .await
            .unwrap();
        assert!(page.exhausted);
        assert_eq!(page.units.len(), 1);
        assert_eq!(page.units[0].structure().unwrap().container, "source_index");
    }

    #[tokio::test]
    async fn test_discover_skips_hidden_indices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cat/indices"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"index": "source_index"},
                {"index": ".kibana"},
                {"index": "another_index"}
            ])))
            .mount(&server)
            .await;

        let es = transport(&server.uri(), None);
        assert_eq!(es.discover().await.unwrap(), vec!["another_index", "source_index"]);
    }

    #[tokio::test]
    async fn test_clear_scroll_tolerates_missing_context() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let es = transport(&server.uri(), None);
        es.clear_cursor("scroll-1").await.unwrap();
    }
}
