//! token.rs
//! The Data Correlation Token: a dataset table plus either an expression tree
//! (version 0) or a precomputed contribution vector (version 1).

use super::error::FormatError;
use super::wire::{self, Reader};
use crate::compute::{differentiate_at, evaluate, ContributionVector, PartialSource, Partials, PropagationError, ValueSource};
use crate::config::{CodecSettings, FloatWidth};
use crate::graph::{Blake3Hasher, ExpressionGraph, NodeHash, NodeHasher};
use crate::store::{Component, DatasetRef, DatasetRegistry, NodeId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

/// Literal prefix of the text form.
pub const TOKEN_PREFIX: &str = "dct_";

/// Leading byte of the binary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SchemaVersion {
    Expression = 0x00,
    Contributions = 0x01,
}

impl SchemaVersion {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Expression),
            0x01 => Some(Self::Contributions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    /// Version 0. The graph owns the token's dataset registry.
    Expression { graph: ExpressionGraph, root: NodeId },
    /// Version 1.
    Contributions { datasets: DatasetRegistry, vector: ContributionVector },
}

/// A decoded or freshly built token. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Token {
    payload: Payload,
}

impl Token {
    /// Wraps an expression. Every dataset in the graph's registry is written
    /// to the table, reachable or not; use `TokenBuilder::token` for a pruned
    /// token.
    pub fn from_expression(graph: ExpressionGraph, root: NodeId) -> Self {
        Self { payload: Payload::Expression { graph, root } }
    }

    pub fn from_contributions(datasets: DatasetRegistry, vector: ContributionVector) -> Result<Self, FormatError> {
        if let Some(max) = vector.max_ref() {
            if !datasets.contains_ref(max) {
                return Err(FormatError::InvalidReference { index: max.0, count: datasets.count() });
            }
        }
        Ok(Self { payload: Payload::Contributions { datasets, vector } })
    }

    pub fn payload(&self) -> &Payload { &self.payload }

    pub fn version(&self) -> SchemaVersion {
        match self.payload {
            Payload::Expression { .. } => SchemaVersion::Expression,
            Payload::Contributions { .. } => SchemaVersion::Contributions,
        }
    }

    /// The graph and root of a version-0 token.
    pub fn expression(&self) -> Option<(&ExpressionGraph, NodeId)> {
        match &self.payload {
            Payload::Expression { graph, root } => Some((graph, *root)),
            Payload::Contributions { .. } => None,
        }
    }

    pub fn contributions(&self) -> Option<&ContributionVector> {
        match &self.payload {
            Payload::Contributions { vector, .. } => Some(vector),
            Payload::Expression { .. } => None,
        }
    }

    pub fn root_hash(&self) -> Option<NodeHash> {
        self.expression().map(|(graph, root)| graph.hash(root))
    }

    // --- Encoding ---

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.version() as u8];
        wire::write_datasets(self.datasets(), &mut out);
        match &self.payload {
            Payload::Expression { graph, root } => wire::write_tree(graph, *root, &mut out),
            Payload::Contributions { vector, .. } => {
                for (&(dataset, moment), value) in vector.iter() {
                    wire::put_u16(&mut out, dataset.0);
                    out.push(moment.0);
                    wire::put_scalar(&mut out, value);
                }
            }
        }
        out
    }

    pub fn encode(&self) -> String {
        let bytes = self.to_bytes();
        tracing::debug!(
            version = self.version() as u8,
            datasets = self.datasets().count(),
            bytes = bytes.len(),
            "Encoded token"
        );
        format!("{}{}", TOKEN_PREFIX, STANDARD.encode(&bytes))
    }

    // --- Decoding ---

    pub fn decode(text: &str) -> Result<Self, FormatError> {
        Self::decode_with(text, &CodecSettings::default())
    }

    pub fn decode_with(text: &str, settings: &CodecSettings) -> Result<Self, FormatError> {
        Self::decode_with_hasher(text, settings, Arc::new(Blake3Hasher))
    }

    /// The node hasher is not part of the wire form. A token built on a
    /// non-default hasher must be decoded with that hasher to get back the
    /// same canonical hashes.
    pub fn decode_with_hasher(
        text: &str,
        settings: &CodecSettings,
        hasher: Arc<dyn NodeHasher>,
    ) -> Result<Self, FormatError> {
        let body = text
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| FormatError::malformed(format!("missing '{}' prefix", TOKEN_PREFIX)))?;
        let bytes = STANDARD
            .decode(body)
            .map_err(|e| FormatError::malformed(format!("invalid base64: {}", e)))?;
        Self::from_bytes_with_hasher(&bytes, settings, hasher)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        Self::from_bytes_with(bytes, &CodecSettings::default())
    }

    pub fn from_bytes_with(bytes: &[u8], settings: &CodecSettings) -> Result<Self, FormatError> {
        Self::from_bytes_with_hasher(bytes, settings, Arc::new(Blake3Hasher))
    }

    pub fn from_bytes_with_hasher(
        bytes: &[u8],
        settings: &CodecSettings,
        hasher: Arc<dyn NodeHasher>,
    ) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);
        let raw_version = reader.u8()?;
        let version = SchemaVersion::from_byte(raw_version).ok_or(FormatError::UnsupportedVersion(raw_version))?;
        let datasets = wire::read_datasets(&mut reader)?;

        let payload = match version {
            SchemaVersion::Expression => {
                let mut graph = ExpressionGraph::with_datasets(datasets, hasher);
                let root = wire::read_tree(&mut reader, &mut graph, settings.max_nodes)?;
                if !reader.is_empty() {
                    return Err(FormatError::malformed(format!(
                        "{} trailing bytes after the root expression",
                        reader.remaining()
                    )));
                }
                Payload::Expression { graph, root }
            }
            SchemaVersion::Contributions => {
                let vector = read_contributions(&mut reader, &datasets, settings.max_nodes)?;
                Payload::Contributions { datasets, vector }
            }
        };

        let token = Self { payload };
        tracing::debug!(version = raw_version, datasets = token.datasets().count(), bytes = bytes.len(), "Decoded token");
        Ok(token)
    }

    // --- Evaluation ---

    /// Value of the derived quantity. Only an expression can be evaluated.
    pub fn evaluate(&self, values: &dyn ValueSource) -> Result<f64, PropagationError> {
        match &self.payload {
            Payload::Expression { graph, root } => evaluate(graph, *root, values),
            Payload::Contributions { .. } => Err(PropagationError::NotAnExpression),
        }
    }

    /// Freezes the partials evaluated at `values` into a version-1 token over
    /// the same dataset table. A version-1 token converts to itself.
    pub fn to_contributions(&self, values: &dyn ValueSource, width: FloatWidth) -> Result<Self, PropagationError> {
        let partials = self.partials(values)?;
        let vector = ContributionVector::from_partials(&partials, width);
        Ok(Self {
            payload: Payload::Contributions { datasets: self.datasets().clone(), vector },
        })
    }
}

fn read_contributions(
    reader: &mut Reader<'_>,
    datasets: &DatasetRegistry,
    max_records: usize,
) -> Result<ContributionVector, FormatError> {
    let mut vector = ContributionVector::new();
    while !reader.is_empty() {
        if vector.len() >= max_records {
            return Err(FormatError::malformed(format!("more than {} contribution records", max_records)));
        }
        let index = reader.u16()?;
        let moment = Component(reader.u8()?);
        if !datasets.contains_ref(DatasetRef(index)) {
            return Err(FormatError::InvalidReference { index, count: datasets.count() });
        }
        let value = reader.scalar()?;
        if vector.insert(DatasetRef(index), moment, value).is_some() {
            return Err(FormatError::malformed(format!("duplicate contribution for d{}.{}", index, moment)));
        }
    }
    Ok(vector)
}

impl PartialSource for Token {
    fn datasets(&self) -> &DatasetRegistry {
        match &self.payload {
            Payload::Expression { graph, .. } => graph.datasets(),
            Payload::Contributions { datasets, .. } => datasets,
        }
    }

    fn partials(&self, values: &dyn ValueSource) -> Result<Partials, PropagationError> {
        match &self.payload {
            Payload::Expression { graph, root } => Ok(differentiate_at(graph, *root, values)?.partials),
            Payload::Contributions { datasets, vector } => vector.to_partials(datasets),
        }
    }
}

impl Token {
    pub fn datasets(&self) -> &DatasetRegistry {
        PartialSource::datasets(self)
    }
}

/// Structural equality: same version, same dataset table in the same order,
/// and the same root hash or the same contribution records.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        if self.datasets().datasets() != other.datasets().datasets() {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Expression { graph: a, root: ra }, Payload::Expression { graph: b, root: rb }) => {
                a.hash(*ra) == b.hash(*rb)
            }
            (Payload::Contributions { vector: a, .. }, Payload::Contributions { vector: b, .. }) => a == b,
            _ => false,
        }
    }
}
