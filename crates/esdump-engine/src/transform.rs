//! Record transform: reduces fetched units to what the declared type writes.

use esdump_core::{Error, Result, Structure, TransferType, Unit};
use serde_json::{Value, json};

/// Transforms one fetched unit for the declared transfer type.
///
/// A unit whose kind does not match `kind` is rejected as
/// `MalformedRecord`.
pub fn transform(unit: Unit, kind: TransferType, source_only: bool) -> Result<Unit> {
    match (kind, unit) {
        (TransferType::Data, Unit::Document(record) | Unit::Source(record)) => Ok(if source_only {
            Unit::Source(record)
        } else {
            Unit::Document(record)
        }),
        (_, Unit::Structure(structure)) if structure.kind == kind => {
            reduce(structure).map(Unit::Structure)
        }
        (kind, unit) => Err(Error::malformed_record().with_message(format!(
            "'{}' does not match transfer type '{kind}'",
            unit.label()
        ))),
    }
}

fn reduce(structure: Structure) -> Result<Structure> {
    let body = match structure.kind {
        TransferType::Mapping => json!({ "mappings": required(&structure, &["mappings"])? }),
        TransferType::Analyzer => {
            json!({ "settings": { "index": { "analysis": required(&structure, &["settings", "index", "analysis"])? } } })
        }
        TransferType::Alias => json!({ "aliases": required(&structure, &["aliases"])? }),
        TransferType::Template | TransferType::Data => return Ok(structure),
    };
    Ok(Structure { body, ..structure })
}

/// Looks up a nested section of a structure body.
fn required(structure: &Structure, path: &[&str]) -> Result<Value> {
    path.iter()
        .try_fold(&structure.body, |value, key| value.get(key))
        .cloned()
        .ok_or_else(|| {
            Error::malformed_record().with_message(format!(
                "{} for '{}' has no '{}' section",
                structure.kind,
                structure.container,
                path.join(".")
            ))
        })
}

#[cfg(test)]
mod tests {
    use esdump_core::{ContainerRef, ErrorKind, Record};

    use super::*;

    fn record() -> Record {
        Record::new("1", ContainerRef::new("source_index"), json!({"key": "key1"}))
    }

    #[test]
    fn test_documents_pass_through() {
        let unit = transform(Unit::Document(record()), TransferType::Data, false).unwrap();
        assert_eq!(unit, Unit::Document(record()));

        let unit = transform(Unit::Document(record()), TransferType::Data, true).unwrap();
        assert_eq!(unit.to_value(), json!({"key": "key1"}));
        assert_eq!(unit.record().map(|r| r.identity.as_str()), Some("1"));
    }

    #[test]
    fn test_analyzer_drops_read_only_settings() {
        let structure = Structure::new(
            "source_index",
            TransferType::Analyzer,
            json!({"settings": {"index": {
                "uuid": "3x0yZ",
                "version": {"created": "7100099"},
                "creation_date": "1600000000000",
                "number_of_shards": "1",
                "analysis": {"analyzer": {"content": {"type": "custom", "tokenizer": "whitespace"}}}
            }}}),
        );
        let unit = transform(Unit::Structure(structure), TransferType::Analyzer, false).unwrap();
        assert_eq!(
            unit.structure().unwrap().body,
            json!({"settings": {"index": {"analysis": {"analyzer": {"content": {
                "type": "custom",
                "tokenizer": "whitespace"
            }}}}}})
        );
    }

    #[test]
    fn test_mapping_and_alias_reduced() {
        let mapping = Structure::new(
            "source_index",
            TransferType::Mapping,
            json!({"mappings": {"properties": {}}, "extra": true}),
        );
        let unit = transform(Unit::Structure(mapping), TransferType::Mapping, false).unwrap();
        assert_eq!(unit.structure().unwrap().body, json!({"mappings": {"properties": {}}}));

        let alias = Structure::new("source_index", TransferType::Alias, json!({"aliases": {}}));
        assert!(transform(Unit::Structure(alias), TransferType::Alias, false).is_ok());
    }

    #[test]
    fn test_template_is_unchanged() {
        let body = json!({"index_patterns": ["logs-*"], "settings": {}, "order": 1});
        let template = Structure::new("logs", TransferType::Template, body.clone());
        let unit = transform(Unit::Structure(template), TransferType::Template, false).unwrap();
        assert_eq!(unit.structure().unwrap().body, body);
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let err = transform(Unit::Document(record()), TransferType::Mapping, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);

        let alias = Structure::new("source_index", TransferType::Alias, json!({"aliases": {}}));
        let err = transform(Unit::Structure(alias), TransferType::Data, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);

        let settings = Structure::new("source_index", TransferType::Analyzer, json!({"settings": {}}));
        let err = transform(Unit::Structure(settings), TransferType::Analyzer, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
    }
}
