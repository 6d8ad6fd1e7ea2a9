//! Streams materialized sets out as tab-delimited exports or manifest
//! archives.
//!
//! Writers emit row by row into the caller's sink and flush on a small
//! constant cadence; the full output is never buffered. Backpressure is the
//! sink's concern. Member order is id-sorted so repeated exports of the same
//! set are byte-identical.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;

use crate::common::ServiceError;

use super::models::{EntitySet, EntityType};

/// Rows written between flushes.
const FLUSH_EVERY: usize = 256;

/// Write a finished set's members as tab-separated rows.
///
/// Gene sets are written as `id<TAB>symbol` when a symbol is known;
/// everything else is a single-column id list.
pub fn export_members<W: Write>(
    set: &EntitySet,
    members: &[String],
    symbols: &HashMap<String, String>,
    sink: W,
) -> Result<(), ServiceError> {
    if !set.state.is_finished() {
        return Err(ServiceError::Export(format!(
            "set '{}' is not finished",
            set.id
        )));
    }

    let mut sorted: Vec<&String> = members.iter().collect();
    sorted.sort_unstable();

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_writer(sink);

    for (index, id) in sorted.into_iter().enumerate() {
        let symbol = (set.entity_type == EntityType::Gene)
            .then(|| symbols.get(id))
            .flatten();
        match symbol {
            Some(symbol) => writer
                .write_record([id.as_str(), symbol.as_str()])
                .map_err(|e| ServiceError::Internal(e.into()))?,
            None => writer
                .write_record([id.as_str()])
                .map_err(|e| ServiceError::Internal(e.into()))?,
        }
        if (index + 1) % FLUSH_EVERY == 0 {
            writer.flush().map_err(|e| ServiceError::Internal(e.into()))?;
        }
    }

    writer.flush().map_err(|e| ServiceError::Internal(e.into()))?;
    Ok(())
}

/// Write a gzip-compressed manifest: a generation header followed by one
/// section per source repository.
pub fn write_manifest<W: Write>(
    set: &EntitySet,
    repositories: &BTreeMap<String, Vec<String>>,
    generated: DateTime<Utc>,
    sink: W,
) -> Result<(), ServiceError> {
    if !set.state.is_finished() {
        return Err(ServiceError::Export(format!(
            "set '{}' is not finished",
            set.id
        )));
    }

    let mut encoder = GzEncoder::new(sink, Compression::default());
    write_manifest_body(set, repositories, generated, &mut encoder)
        .and_then(|()| encoder.finish().map(|_| ()))
        .map_err(|e| ServiceError::Internal(e.into()))
}

fn write_manifest_body<W: Write>(
    set: &EntitySet,
    repositories: &BTreeMap<String, Vec<String>>,
    generated: DateTime<Utc>,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "# manifest\t{}", set.id)?;
    writeln!(out, "# name\t{}", set.name)?;
    writeln!(out, "# generated\t{}", generated.to_rfc3339())?;
    writeln!(out, "# repositories\t{}", repositories.len())?;

    for (repository, ids) in repositories {
        writeln!(out)?;
        writeln!(out, "## repository\t{}\t{} entries", repository, ids.len())?;
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort_unstable();
        for (index, id) in sorted.into_iter().enumerate() {
            writeln!(out, "{id}")?;
            if (index + 1) % FLUSH_EVERY == 0 {
                out.flush()?;
            }
        }
    }
    out.flush()
}

/// An `io::Write` sink that forwards chunks into a tokio channel, bridging
/// the blocking export writers into a streamed HTTP response body.
///
/// Must be driven from a blocking context (`spawn_blocking`); a dropped
/// receiver surfaces as a broken pipe, which aborts the export.
pub struct ChannelWriter {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export receiver dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Filters;
    use crate::domains::entityset::models::{EntitySetDefinition, SortOrder};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn finished_set(entity_type: EntityType, count: u64) -> EntitySet {
        EntitySet::from_definition(&EntitySetDefinition {
            filters: Filters::None,
            sort_by: "id".into(),
            sort_order: SortOrder::Ascending,
            name: "export me".into(),
            description: None,
            entity_type,
            size: 0,
            is_transient: false,
        })
        .finished(count)
    }

    #[test]
    fn test_export_rejects_unfinished_set() {
        let set = finished_set(EntityType::Donor, 0).errored("nope");
        let mut sink = Vec::new();
        let result = export_members(&set, &[], &HashMap::new(), &mut sink);
        assert!(matches!(result, Err(ServiceError::Export(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_export_is_sorted_and_tab_delimited() {
        let set = finished_set(EntityType::Donor, 3);
        let members = vec!["D3".to_string(), "D1".to_string(), "D2".to_string()];
        let mut sink = Vec::new();
        export_members(&set, &members, &HashMap::new(), &mut sink).unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "D1\nD2\nD3\n");
    }

    #[test]
    fn test_gene_export_includes_symbols() {
        let set = finished_set(EntityType::Gene, 2);
        let members = vec!["ENSG2".to_string(), "ENSG1".to_string()];
        let symbols = HashMap::from([("ENSG1".to_string(), "TP53".to_string())]);
        let mut sink = Vec::new();
        export_members(&set, &members, &symbols, &mut sink).unwrap();
        assert_eq!(
            String::from_utf8(sink).unwrap(),
            "ENSG1\tTP53\nENSG2\n"
        );
    }

    #[test]
    fn test_export_round_trip_preserves_member_set() {
        let set = finished_set(EntityType::Mutation, 3);
        let members = vec!["MU3".to_string(), "MU1".to_string(), "MU2".to_string()];
        let mut sink = Vec::new();
        export_members(&set, &members, &HashMap::new(), &mut sink).unwrap();

        let reingested: std::collections::HashSet<String> = String::from_utf8(sink)
            .unwrap()
            .lines()
            .map(|line| line.split('\t').next().unwrap().to_string())
            .collect();
        let original: std::collections::HashSet<String> = members.into_iter().collect();
        assert_eq!(reingested, original);
    }

    #[test]
    fn test_manifest_groups_by_repository() {
        let set = finished_set(EntityType::File, 3);
        let repositories = BTreeMap::from([
            ("collab".to_string(), vec!["F2".to_string(), "F1".to_string()]),
            ("pdc".to_string(), vec!["F3".to_string()]),
        ]);

        let mut sink = Vec::new();
        write_manifest(&set, &repositories, Utc::now(), &mut sink).unwrap();

        let mut text = String::new();
        GzDecoder::new(sink.as_slice())
            .read_to_string(&mut text)
            .unwrap();

        assert!(text.starts_with("# manifest\t"));
        assert!(text.contains("# repositories\t2"));
        assert!(text.contains("## repository\tcollab\t2 entries"));
        assert!(text.contains("## repository\tpdc\t1 entries"));
        let collab_pos = text.find("collab").unwrap();
        assert!(text[collab_pos..].find("F1").unwrap() < text[collab_pos..].find("F2").unwrap());
    }
}
