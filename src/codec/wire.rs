//! Big-endian byte framing and the pre-order tree encoding.

use super::error::FormatError;
use crate::graph::{BinaryOp, ExprNode, ExpressionGraph, ScalarValue, UnaryOp};
use crate::store::{BaseDataset, Component, DatasetRef, DatasetRegistry, NodeId};

/// Cursor over an input buffer. Every read is bounds-checked and reports
/// `Truncated` instead of panicking.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize { self.pos }
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }
    pub fn is_empty(&self) -> bool { self.remaining() == 0 }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated { offset: self.pos, needed: n, available: self.remaining() });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, FormatError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// `value_type (1B) + length (1B) + value bytes`, shared by constants and
    /// contribution records.
    pub fn scalar(&mut self) -> Result<ScalarValue, FormatError> {
        let value_type = self.u8()?;
        let length = self.u8()?;
        let bytes = self.take(length as usize)?;
        ScalarValue::from_bytes(value_type, bytes)
            .ok_or(FormatError::InvalidConstantEncoding { value_type, length })
    }
}

pub fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_scalar(out: &mut Vec<u8>, value: &ScalarValue) {
    let bytes = value.to_bytes();
    out.push(value.value_type() as u8);
    out.push(bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

/// `N (2B)` then `hash_type (2B) + length (1B) + hash bytes` per dataset.
pub fn write_datasets(registry: &DatasetRegistry, out: &mut Vec<u8>) {
    put_u16(out, registry.count() as u16);
    for (_, dataset) in registry.iter() {
        put_u16(out, dataset.hash_type);
        out.push(dataset.hash_bytes.len() as u8);
        out.extend_from_slice(&dataset.hash_bytes);
    }
}

pub fn read_datasets(reader: &mut Reader<'_>) -> Result<DatasetRegistry, FormatError> {
    let count = reader.u16()?;
    let mut registry = DatasetRegistry::new();
    for i in 0..count {
        let hash_type = reader.u16()?;
        let length = reader.u8()?;
        let hash_bytes = reader.take(length as usize)?;
        let dataset = BaseDataset::new(hash_type, hash_bytes);
        if registry.find(&dataset).is_some() {
            return Err(FormatError::malformed(format!("dataset entry {} repeats an earlier entry", i)));
        }
        registry
            .register_dataset(dataset)
            .map_err(|e| FormatError::malformed(e.to_string()))?;
    }
    Ok(registry)
}

/// Writes the DAG under `root` as a pre-order tree. Shared nodes are written
/// once per use; the decoder collapses them again.
pub fn write_tree(graph: &ExpressionGraph, root: NodeId, out: &mut Vec<u8>) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = graph.node(id);
        out.push(node.opcode());
        match *node {
            ExprNode::Variable { dataset, component } => {
                put_u16(out, dataset.0);
                out.push(component.0);
            }
            ExprNode::Constant(value) => put_scalar(out, &value),
            ExprNode::Unary { child, .. } => stack.push(child),
            ExprNode::Binary { lhs, rhs, .. } => {
                stack.push(rhs);
                stack.push(lhs);
            }
        }
    }
}

enum Pending {
    Unary(UnaryOp),
    Binary(BinaryOp, Option<NodeId>),
}

/// Reads one pre-order tree into `graph`, whose registry must already hold
/// the token's datasets. Uses an explicit stack of operators awaiting
/// operands, so input depth never touches the call stack.
pub fn read_tree(reader: &mut Reader<'_>, graph: &mut ExpressionGraph, max_nodes: usize) -> Result<NodeId, FormatError> {
    let mut pending: Vec<Pending> = Vec::new();
    let mut seen = 0usize;

    loop {
        seen += 1;
        if seen > max_nodes {
            return Err(FormatError::malformed(format!("tree exceeds the {} node limit", max_nodes)));
        }

        let offset = reader.position();
        let opcode = reader.u8()?;
        let mut done = match opcode {
            ExprNode::VARIABLE_OPCODE => {
                let index = reader.u16()?;
                let component = Component(reader.u8()?);
                let count = graph.datasets().count();
                if index as usize >= count {
                    return Err(FormatError::InvalidReference { index, count });
                }
                graph
                    .variable(DatasetRef(index), component)
                    .map_err(|_| FormatError::InvalidReference { index, count })?
            }
            ExprNode::CONSTANT_OPCODE => {
                let value = reader.scalar()?;
                graph.constant(value)
            }
            other => {
                if let Some(op) = UnaryOp::from_opcode(other) {
                    pending.push(Pending::Unary(op));
                } else if let Some(op) = BinaryOp::from_opcode(other) {
                    pending.push(Pending::Binary(op, None));
                } else {
                    return Err(FormatError::UnknownOpcode { opcode: other, offset });
                }
                continue;
            }
        };

        // Fold the finished operand into the operators waiting for it.
        loop {
            match pending.pop() {
                None => return Ok(done),
                Some(Pending::Unary(op)) => done = graph.unary(op, done),
                Some(Pending::Binary(op, None)) => {
                    pending.push(Pending::Binary(op, Some(done)));
                    break;
                }
                Some(Pending::Binary(op, Some(lhs))) => done = graph.binary(op, lhs, done),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = Reader::new(&[0x01]);
        let err = reader.u16().unwrap_err();
        assert_eq!(err, FormatError::Truncated { offset: 0, needed: 2, available: 1 });
    }

    #[test]
    fn test_tree_layout_is_preorder() {
        let mut g = ExpressionGraph::new();
        let r = g.register_dataset(7, b"k").unwrap();
        let v = g.variable(r, Component::VALUE).unwrap();
        let c = g.constant(ScalarValue::Int32(2));
        let root = g.mul(v, c);

        let mut out = Vec::new();
        write_tree(&g, root, &mut out);
        assert_eq!(
            out,
            vec![0x42, 0x01, 0x00, 0x00, 0x01, 0x02, 0x01, 0x04, 0x00, 0x00, 0x00, 0x02]
        );
    }

    #[test]
    fn test_read_tree_rebuilds_sharing() {
        let mut g = ExpressionGraph::new();
        let r = g.register_dataset(7, b"k").unwrap();
        let v = g.variable(r, Component::VALUE).unwrap();
        let e = g.exp(v);
        let root = g.add(e, e);

        let mut out = Vec::new();
        write_tree(&g, root, &mut out);

        let mut target = ExpressionGraph::new();
        target.register_dataset(7, b"k").unwrap();
        let decoded = read_tree(&mut Reader::new(&out), &mut target, 100).unwrap();
        assert_eq!(target.hash(decoded), g.hash(root));
        assert_eq!(target.node_count(), 3);
    }

    #[test]
    fn test_read_tree_node_limit() {
        let mut g = ExpressionGraph::new();
        let one = g.constant(ScalarValue::Int32(1));
        let root = g.add(one, one);
        let mut out = Vec::new();
        write_tree(&g, root, &mut out);

        let mut target = ExpressionGraph::new();
        let err = read_tree(&mut Reader::new(&out), &mut target, 2).unwrap_err();
        assert!(matches!(err, FormatError::Malformed(_)));
    }
}
