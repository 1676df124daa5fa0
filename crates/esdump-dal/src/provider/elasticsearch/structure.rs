//! Structural writes: mappings, analyzer settings, templates and aliases.

use esdump_core::{Error, Result, Structure, TransferType};
use esdump_reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use super::{ElasticsearchTransport, TRACING_TARGET};
use crate::core::{RecordFailure, WriteOutcome};

/// Returns whether a mapping body is keyed by sub-type
/// (`{"seeds": {"properties": ..}}`) rather than typeless.
fn is_typed_mapping(mappings: &Value) -> bool {
    let Some(map) = mappings.as_object() else {
        return false;
    };
    !map.is_empty()
        && !map.contains_key("properties")
        && map
            .values()
            .all(|body| body.get("properties").is_some_and(Value::is_object))
}

/// Extracts a required section of a transformed structure body.
fn section<'a>(structure: &'a Structure, key: &str) -> Result<&'a Value> {
    structure.body.get(key).ok_or_else(|| {
        Error::malformed_record().with_message(format!(
            "{} for '{}' has no '{key}' section",
            structure.kind, structure.container
        ))
    })
}

impl ElasticsearchTransport {
    /// Writes one structure. Rejections are reported in the outcome;
    /// retryable failures are returned as errors.
    pub(super) async fn write_structure(&self, structure: Structure) -> Result<WriteOutcome> {
        let target = match (&self.container, structure.kind) {
            (_, TransferType::Template) | (None, _) => structure.container.clone(),
            (Some(container), _) => container.index.clone(),
        };

        let result = match structure.kind {
            TransferType::Mapping => self.put_mapping(&target, &structure).await,
            TransferType::Analyzer => self.put_analysis(&target, &structure).await,
            TransferType::Template => self.put_template(&target, &structure).await,
            TransferType::Alias => self.put_aliases(&target, &structure).await,
            TransferType::Data => Err(Error::internal().with_message("documents are not structures")),
        };

        let label = format!("{}:{}", structure.kind, target);
        match result {
            Ok(()) => {
                tracing::debug!(target: TRACING_TARGET, structure = %label, "Wrote structure");
                Ok(WriteOutcome {
                    written: 1,
                    ..WriteOutcome::default()
                })
            }
            Err(err) if err.is_retryable() => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    structure = %label,
                    error = %err,
                    "Destination rejected structure"
                );
                Ok(WriteOutcome {
                    failures: vec![RecordFailure::new(label, &err)],
                    ..WriteOutcome::default()
                })
            }
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.endpoint(&[index])?;
        let response = self.send(Method::HEAD, url, None).await?;
        match response.status {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(response.error_for_status().err().map_or_else(Error::internal, Error::from)),
        }
    }

    /// Creates the index with the mapping, or updates the mapping of an
    /// existing index (per sub-type for typed mappings).
    async fn put_mapping(&self, index: &str, structure: &Structure) -> Result<()> {
        let mappings = section(structure, "mappings")?;

        if !self.index_exists(index).await? {
            let url = self.endpoint(&[index])?;
            self.send_checked(Method::PUT, url, Some(&json!({ "mappings": mappings })))
                .await?;
            return Ok(());
        }

        match mappings.as_object() {
            Some(types) if is_typed_mapping(mappings) => {
                for (subtype, body) in types {
                    let url = self.endpoint(&[index, "_mapping", subtype.as_str()])?;
                    self.send_checked(Method::PUT, url, Some(&json!({ subtype: body })))
                        .await?;
                }
            }
            _ => {
                let url = self.endpoint(&[index, "_mapping"])?;
                self.send_checked(Method::PUT, url, Some(mappings)).await?;
            }
        }
        Ok(())
    }

    /// Creates the index with the analysis settings, or closes the existing
    /// index, updates its settings and re-opens it.
    async fn put_analysis(&self, index: &str, structure: &Structure) -> Result<()> {
        let settings = section(structure, "settings")?;

        if !self.index_exists(index).await? {
            let url = self.endpoint(&[index])?;
            self.send_checked(Method::PUT, url, Some(&structure.body))
                .await?;
            return Ok(());
        }

        self.send_checked(Method::POST, self.endpoint(&[index, "_close"])?, None)
            .await?;
        let updated = self
            .send_checked(Method::PUT, self.endpoint(&[index, "_settings"])?, Some(settings))
            .await;
        // Re-open even when the update failed.
        let reopened = self
            .send_checked(Method::POST, self.endpoint(&[index, "_open"])?, None)
            .await;

        updated?;
        reopened?;
        Ok(())
    }

    async fn put_template(&self, name: &str, structure: &Structure) -> Result<()> {
        let url = self.endpoint(&["_template", name])?;
        self.send_checked(Method::PUT, url, Some(&structure.body))
            .await?;
        Ok(())
    }

    /// Adds every alias of the body to the index in one `_aliases` request.
    async fn put_aliases(&self, index: &str, structure: &Structure) -> Result<()> {
        let aliases = section(structure, "aliases")?;
        let Some(aliases) = aliases.as_object() else {
            return Err(Error::malformed_record()
                .with_message(format!("aliases for '{}' is not an object", structure.container)));
        };
        if aliases.is_empty() {
            return Ok(());
        }

        let actions: Vec<Value> = aliases
            .iter()
            .map(|(alias, options)| {
                let mut add = options.as_object().cloned().unwrap_or_default();
                add.insert("index".into(), Value::from(index));
                add.insert("alias".into(), Value::from(alias.as_str()));
                json!({ "add": add })
            })
            .collect();

        let url = self.endpoint(&["_aliases"])?;
        self.send_checked(Method::POST, url, Some(&json!({ "actions": actions })))
            .await?;
        Ok(())
    }
}
