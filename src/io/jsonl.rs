use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{CodecError, GraphCodec, GraphReader, GraphWriter};
use crate::structure::{ElementId, Graph, VertexId};
use crate::value::Value;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record {
    Vertex {
        id: u64,
        label: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, Value>,
    },
    Edge {
        id: u64,
        label: String,
        out_v: u64,
        in_v: u64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, Value>,
    },
}

/// Newline-delimited JSON snapshot codec.
///
/// Every vertex is written before any edge. On read, the target graph allocates
/// fresh identifiers; edge endpoints are remapped through the identifiers the
/// snapshot recorded for its vertices. Blank lines are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesCodec;

impl GraphCodec for JsonLinesCodec {
    fn name(&self) -> &'static str {
        "jsonl"
    }
}

impl GraphReader for JsonLinesCodec {
    fn read_graph(&self, input: &mut dyn BufRead, graph: &dyn Graph) -> Result<(), CodecError> {
        let mut remap: FxHashMap<u64, VertexId> = FxHashMap::default();
        let mut line = String::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(trimmed).map_err(|source| {
                CodecError::Json {
                    line: line_no,
                    source,
                }
            })?;
            match record {
                Record::Vertex {
                    id,
                    label,
                    properties,
                } => {
                    let vertex = graph.add_vertex(&label)?;
                    for (key, value) in properties {
                        graph.set_property(ElementId::Vertex(vertex.id()), &key, value)?;
                    }
                    if remap.insert(id, vertex.id()).is_some() {
                        return Err(CodecError::Format {
                            line: line_no,
                            reason: format!("vertex {id} appears more than once"),
                        });
                    }
                }
                Record::Edge {
                    label,
                    out_v,
                    in_v,
                    properties,
                    ..
                } => {
                    let resolve = |id: u64| {
                        remap.get(&id).copied().ok_or_else(|| CodecError::Format {
                            line: line_no,
                            reason: format!("edge references unknown vertex {id}"),
                        })
                    };
                    let edge = graph.add_edge(&label, resolve(out_v)?, resolve(in_v)?)?;
                    for (key, value) in properties {
                        graph.set_property(ElementId::Edge(edge.id()), &key, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl GraphWriter for JsonLinesCodec {
    fn write_graph(&self, output: &mut dyn Write, graph: &dyn Graph) -> Result<(), CodecError> {
        let mut line_no = 0usize;
        let mut emit = |record: &Record, output: &mut dyn Write| -> Result<(), CodecError> {
            line_no += 1;
            serde_json::to_writer(&mut *output, record).map_err(|source| CodecError::Json {
                line: line_no,
                source,
            })?;
            output.write_all(b"\n")?;
            Ok(())
        };
        for vertex in graph.vertices()? {
            let record = Record::Vertex {
                id: vertex.id().0,
                label: vertex.label().to_owned(),
                properties: graph.properties(ElementId::Vertex(vertex.id()))?,
            };
            emit(&record, &mut *output)?;
        }
        for edge in graph.edges()? {
            let record = Record::Edge {
                id: edge.id().0,
                label: edge.label().to_owned(),
                out_v: edge.out_v().0,
                in_v: edge.in_v().0,
                properties: graph.properties(ElementId::Edge(edge.id()))?,
            };
            emit(&record, &mut *output)?;
        }
        Ok(())
    }
}
