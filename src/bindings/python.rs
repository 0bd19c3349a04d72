use crate::analysis::ExpressionStats;
use crate::codec::{FormatError, Token, TokenBuilder};
use crate::compute::{Ledger, PropagationError, Propagator};
use crate::config::{FloatWidth, Settings};
use crate::display::{format_expression, format_trace, parse_pattern, ParseError};
use crate::graph::{BinaryOp, UnaryOp};
use crate::store::{BaseDataset, Component, NodeId, RegistryError};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn format_err(e: FormatError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn registry_err(e: RegistryError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_err(e: ParseError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn propagation_err(e: PropagationError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

#[pyclass(name = "Ledger")]
#[derive(Debug, Clone, Default)]
pub struct PyLedger {
    pub(crate) inner: Ledger,
}

#[pymethods]
impl PyLedger {
    #[new]
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, hash_type: u16, hash_bytes: Vec<u8>, component: u8, value: f64) {
        self.inner.insert(BaseDataset::new(hash_type, hash_bytes), Component(component), value);
    }

    pub fn insert_measurement(&mut self, hash_type: u16, hash_bytes: Vec<u8>, value: f64, error: f64) {
        self.inner.insert_measurement(BaseDataset::new(hash_type, hash_bytes), value, error);
    }

    pub fn get(&self, hash_type: u16, hash_bytes: Vec<u8>, component: u8) -> Option<f64> {
        self.inner.get(&BaseDataset::new(hash_type, hash_bytes), Component(component))
    }

    pub fn __len__(&self) -> usize { self.inner.len() }
}

#[pyclass(name = "Token")]
#[derive(Debug, Clone)]
pub struct PyToken {
    pub(crate) inner: Token,
}

#[pymethods]
impl PyToken {
    #[staticmethod]
    pub fn decode(text: &str) -> PyResult<Self> {
        Token::decode(text).map(|inner| Self { inner }).map_err(format_err)
    }

    pub fn encode(&self) -> String { self.inner.encode() }
    pub fn version(&self) -> u8 { self.inner.version() as u8 }
    pub fn dataset_count(&self) -> usize { self.inner.datasets().count() }

    pub fn root_hash(&self) -> Option<String> {
        self.inner.root_hash().map(|h| h.to_string())
    }

    /// Infix form of the expression, `None` for a contribution token.
    pub fn format(&self) -> Option<String> {
        self.inner.expression().map(|(graph, root)| format_expression(graph, root))
    }

    pub fn trace(&self) -> Option<String> {
        self.inner.expression().map(|(graph, root)| format_trace(graph, root))
    }

    pub fn stats_json(&self) -> PyResult<Option<String>> {
        match self.inner.expression() {
            Some((graph, root)) => serde_json::to_string(&ExpressionStats::analyze(graph, root))
                .map(Some)
                .map_err(|e| PyRuntimeError::new_err(e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether the root matches a pattern such as `"#1 * exp(#2)"`.
    pub fn matches(&self, pattern: &str) -> PyResult<bool> {
        match self.inner.expression() {
            Some((graph, root)) => parse_pattern(graph, pattern).map(|p| p.matches(graph, root)).map_err(parse_err),
            None => Ok(false),
        }
    }

    pub fn evaluate(&self, ledger: &PyLedger) -> PyResult<f64> {
        self.inner.evaluate(&ledger.inner).map_err(propagation_err)
    }

    #[pyo3(signature = (ledger, single_precision = false))]
    pub fn to_contributions(&self, ledger: &PyLedger, single_precision: bool) -> PyResult<Self> {
        let width = if single_precision { FloatWidth::F32 } else { FloatWidth::F64 };
        self.inner
            .to_contributions(&ledger.inner, width)
            .map(|inner| Self { inner })
            .map_err(propagation_err)
    }

    pub fn __eq__(&self, other: &Self) -> bool { self.inner == other.inner }

    pub fn __repr__(&self) -> String {
        format!("Token(version={}, datasets={})", self.version(), self.dataset_count())
    }
}

#[pyclass(name = "TokenBuilder")]
#[derive(Debug, Clone, Default)]
pub struct PyTokenBuilder {
    inner: TokenBuilder,
}

impl PyTokenBuilder {
    fn node(&self, id: usize) -> PyResult<NodeId> {
        if id < self.inner.graph().node_count() {
            Ok(NodeId::new(id))
        } else {
            Err(PyValueError::new_err(format!("Invalid Node ID {}", id)))
        }
    }
}

#[pymethods]
impl PyTokenBuilder {
    #[new]
    #[pyo3(signature = (settings_json = None))]
    pub fn new(settings_json: Option<&str>) -> PyResult<Self> {
        let settings = match settings_json {
            Some(text) => Settings::from_json_str(text).map_err(|e| PyValueError::new_err(e.to_string()))?,
            None => Settings::default(),
        };
        Ok(Self { inner: TokenBuilder::with_settings(settings.codec) })
    }

    #[pyo3(signature = (hash_type, hash_bytes, alias = None))]
    pub fn dataset(&mut self, hash_type: u16, hash_bytes: Vec<u8>, alias: Option<&str>) -> PyResult<usize> {
        self.inner.dataset(hash_type, &hash_bytes, alias).map(|id| id.index()).map_err(registry_err)
    }

    #[pyo3(signature = (hash_type, hash_bytes, component, alias = None))]
    pub fn component(&mut self, hash_type: u16, hash_bytes: Vec<u8>, component: u8, alias: Option<&str>) -> PyResult<usize> {
        self.inner
            .component(hash_type, &hash_bytes, Component(component), alias)
            .map(|id| id.index())
            .map_err(registry_err)
    }

    pub fn constant(&mut self, value: f64) -> usize { self.inner.float(value).index() }
    pub fn integer(&mut self, value: i64) -> usize { self.inner.integer(value).index() }

    pub fn unary(&mut self, op: &str, x: usize) -> PyResult<usize> {
        let op = UnaryOp::ALL
            .into_iter()
            .find(|u| u.name() == op)
            .ok_or_else(|| PyValueError::new_err(format!("Invalid Op '{}'", op)))?;
        let x = self.node(x)?;
        Ok(self.inner.graph_mut().unary(op, x).index())
    }

    pub fn binary(&mut self, op: &str, x: usize, y: usize) -> PyResult<usize> {
        let op = BinaryOp::ALL
            .into_iter()
            .find(|b| b.name() == op)
            .ok_or_else(|| PyValueError::new_err(format!("Invalid Op '{}'", op)))?;
        let (x, y) = (self.node(x)?, self.node(y)?);
        Ok(self.inner.graph_mut().binary(op, x, y).index())
    }

    /// Builds the nodes for an infix expression over datasets added so far.
    pub fn parse(&mut self, text: &str) -> PyResult<usize> {
        self.inner.parse(text).map(|id| id.index()).map_err(parse_err)
    }

    pub fn alias(&mut self, id: usize, name: &str) -> PyResult<()> {
        let id = self.node(id)?;
        self.inner.alias(id, name);
        Ok(())
    }

    pub fn adopt(&mut self, token: &PyToken) -> PyResult<Option<usize>> {
        self.inner
            .adopt(&token.inner)
            .map(|id| id.map(|n| n.index()))
            .map_err(registry_err)
    }

    pub fn token(&self, root: usize) -> PyResult<PyToken> {
        let root = self.node(root)?;
        self.inner.token(root).map(|inner| PyToken { inner }).map_err(registry_err)
    }
}

#[pyfunction]
pub fn variance(token: &PyToken, ledger: &PyLedger) -> PyResult<f64> {
    Propagator::new(&ledger.inner).variance(&token.inner).map_err(propagation_err)
}

/// Row-major covariance matrix of `tokens`.
#[pyfunction]
pub fn covariance(tokens: Vec<PyRef<'_, PyToken>>, ledger: &PyLedger) -> PyResult<Vec<Vec<f64>>> {
    let refs: Vec<&Token> = tokens.iter().map(|t| &t.inner).collect();
    let matrix = Propagator::new(&ledger.inner).covariance(&refs).map_err(propagation_err)?;
    Ok(matrix.rows().map(|row| row.to_vec()).collect())
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyLedger>()?;
    m.add_class::<PyToken>()?;
    m.add_class::<PyTokenBuilder>()?;
    m.add_function(wrap_pyfunction!(variance, m)?)?;
    m.add_function(wrap_pyfunction!(covariance, m)?)?;
    Ok(())
}
