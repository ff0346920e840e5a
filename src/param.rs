//! Named parameter storage
//!
//! A [`ParamInjection`] is a scope over a [`ParamInjector`]. Layers open child
//! scopes with [`ParamInjection::name_append`] and resolve their parameters by
//! the full scope name, so building the same layer twice under the same scope
//! yields nodes that share one set of parameters.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SharedParams = Arc<RefCell<Param>>;

pub fn shared_params(values: Vec<f64>) -> SharedParams {
    Arc::new(RefCell::new(Param::new(values)))
}
pub fn empty_shared_params() -> SharedParams {
    shared_params(vec![])
}

/// Tunable values plus the gradient accumulated for them during one backpropagation
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    values: Vec<f64>,
    gradient: Vec<f64>,
}
impl Param {
    fn check_rep(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        assert_eq!(self.values.len(), self.gradient.len());
    }

    pub fn new(values: Vec<f64>) -> Self {
        let gradient = vec![0.; values.len()];
        let this = Self { values, gradient };
        this.check_rep();
        this
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn gradient(&self) -> &[f64] {
        &self.gradient
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_values(&mut self, values: Vec<f64>) -> Result<(), ParamError> {
        if values.len() != self.values.len() {
            return Err(ParamError::SizeNotMatched {
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        self.values = values;
        Ok(())
    }

    /// ```math
    /// \frac{\partial E}{\partial w_i} \mathrel{+}= a
    /// ```
    pub fn accumulate_gradient(&mut self, i: usize, addend: f64) {
        self.gradient[i] += addend;
    }

    pub fn clear_gradient(&mut self) {
        self.gradient.iter_mut().for_each(|g| *g = 0.);
    }

    /// ```math
    /// w \leftarrow w - \eta \frac{\partial E}{\partial w}
    /// ```
    ///
    /// Resets the accumulated gradient.
    pub fn apply_gradient(&mut self, step_size: f64) {
        for (w, g) in self.values.iter_mut().zip(self.gradient.iter_mut()) {
            *w -= step_size * *g;
            *g = 0.;
        }
        self.check_rep();
    }
}

/// How a scope resolves a parameter name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reuse {
    /// Get the existing parameter or create it
    #[default]
    Auto,
    /// Always create; the name must be unused
    Forbid,
    /// Always reuse; the name must already exist
    Require,
}

#[derive(Debug, Clone)]
pub struct NamedParams {
    pub name: String,
    pub params: SharedParams,
}

#[derive(Debug, Default)]
pub struct ParamInjector {
    /// values loaded from a previous run, consumed on creation
    prev_params: HashMap<String, Vec<f64>>,
    /// names whose values came from `prev_params`
    seeded: HashSet<String>,
    indices: HashMap<String, usize>,
    /// in creation order
    params: Vec<NamedParams>,
}
impl ParamInjector {
    pub fn new(prev_params: HashMap<String, Vec<f64>>) -> Self {
        Self {
            prev_params,
            seeded: HashSet::new(),
            indices: HashMap::new(),
            params: vec![],
        }
    }
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&SharedParams> {
        let i = *self.indices.get(name)?;
        Some(&self.params[i].params)
    }

    pub fn insert_params(&mut self, name: String, params: SharedParams) -> Result<(), ParamError> {
        if self.indices.contains_key(&name) {
            return Err(ParamError::AlreadyExists { name });
        }
        if let Some(prev) = self.prev_params.get(&name) {
            params.borrow_mut().set_values(prev.clone())?;
            self.prev_params.remove(&name);
            self.seeded.insert(name.clone());
        }
        self.indices.insert(name.clone(), self.params.len());
        self.params.push(NamedParams { name, params });
        Ok(())
    }

    pub fn get_or_create_params<F, I>(
        &mut self,
        name: &str,
        reuse: Reuse,
        create: F,
    ) -> Result<SharedParams, ParamError>
    where
        F: FnOnce() -> I,
        I: IntoIterator<Item = f64>,
    {
        self.try_get_or_create_params(name, reuse, || Ok::<_, ParamError>(create()))
    }

    /// Same as [`Self::get_or_create_params`] with a fallible initializer
    pub fn try_get_or_create_params<F, I, E>(
        &mut self,
        name: &str,
        reuse: Reuse,
        create: F,
    ) -> Result<SharedParams, E>
    where
        F: FnOnce() -> Result<I, E>,
        I: IntoIterator<Item = f64>,
        E: From<ParamError>,
    {
        match (self.get(name), reuse) {
            (Some(_), Reuse::Forbid) => {
                return Err(ParamError::AlreadyExists {
                    name: name.to_string(),
                }
                .into())
            }
            (Some(params), _) => return Ok(Arc::clone(params)),
            (None, Reuse::Require) => {
                return Err(ParamError::NotFound {
                    name: name.to_string(),
                }
                .into())
            }
            (None, _) => (),
        }
        let params = shared_params(create()?.into_iter().collect());
        self.insert_params(name.to_string(), Arc::clone(&params))?;
        Ok(params)
    }

    pub fn checkpoint(&self) -> ParamCheckpoint {
        ParamCheckpoint {
            len: self.params.len(),
        }
    }

    /// Forgets every parameter created since `checkpoint`
    ///
    /// Seeded values consumed by those parameters are returned to the seed.
    pub fn rollback(&mut self, checkpoint: ParamCheckpoint) {
        let start = checkpoint.len.min(self.params.len());
        for named in self.params.drain(start..) {
            self.indices.remove(&named.name);
            if self.seeded.remove(&named.name) {
                let values = named.params.borrow().values().to_vec();
                self.prev_params.insert(named.name, values);
            }
        }
    }

    /// All parameters named `scope` or nested under `scope`, in creation order
    pub fn params_in_scope(&self, scope: &str) -> Vec<NamedParams> {
        let nested = format!("{scope}:");
        self.params
            .iter()
            .filter(|p| scope.is_empty() || p.name == scope || p.name.starts_with(&nested))
            .cloned()
            .collect()
    }

    pub fn params(&self) -> &[NamedParams] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.iter().map(|p| p.params.borrow().len()).sum()
    }

    pub fn collect_parameters(&self) -> HashMap<String, Vec<f64>> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.params.borrow().values().to_vec()))
            .collect()
    }

    pub fn summary(&self) -> ParamSummary {
        summarize(&self.params)
    }

    pub fn log_params(&self, details: bool) {
        self.summary().log(details);
    }
}

/// The set of parameters an injector held at one point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamCheckpoint {
    len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub entries: Vec<ParamSummaryEntry>,
    pub num_params: usize,
}
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummaryEntry {
    pub name: String,
    pub len: usize,
    pub mean: f64,
    pub std_dev: f64,
}
impl ParamSummary {
    pub fn log(&self, details: bool) {
        for (i, entry) in self.entries.iter().enumerate() {
            if details {
                tracing::info!(
                    "param {i:>3}: ({},) {} mean: {:.6} std: {:.6}",
                    entry.len,
                    entry.name,
                    entry.mean,
                    entry.std_dev
                );
            } else {
                tracing::info!("param {i:>3}: ({},) {}", entry.len, entry.name);
            }
        }
        tracing::info!("num of params: {}", self.num_params);
    }
}

pub fn summarize(params: &[NamedParams]) -> ParamSummary {
    let mut entries = vec![];
    let mut seen = HashSet::new();
    let mut num_params = 0;
    for p in params {
        let values = p.params.borrow();
        let values = values.values();
        if seen.insert(Arc::as_ptr(&p.params)) {
            num_params += values.len();
        }
        let (mean, std_dev) = mean_std_dev(values);
        entries.push(ParamSummaryEntry {
            name: p.name.clone(),
            len: values.len(),
            mean,
            std_dev,
        });
    }
    ParamSummary {
        entries,
        num_params,
    }
}

fn mean_std_dev(x: &[f64]) -> (f64, f64) {
    if x.is_empty() {
        return (0., 0.);
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let var = x.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[derive(Debug)]
pub struct ParamInjection<'a> {
    pub injector: &'a mut ParamInjector,
    pub name: String,
    pub reuse: Reuse,
}
impl<'a> ParamInjection<'a> {
    pub fn new(injector: &'a mut ParamInjector) -> Self {
        Self {
            injector,
            name: String::new(),
            reuse: Reuse::default(),
        }
    }

    pub fn name_append(&mut self, name: &str) -> ParamInjection<'_> {
        let name = format!("{}{}", self.name, name);
        ParamInjection {
            injector: &mut *self.injector,
            name,
            reuse: self.reuse,
        }
    }

    pub fn with_reuse(self, reuse: Reuse) -> Self {
        Self { reuse, ..self }
    }

    pub fn get_or_create_params<F, I>(self, create: F) -> Result<SharedParams, ParamError>
    where
        F: FnOnce() -> I,
        I: IntoIterator<Item = f64>,
    {
        self.injector
            .get_or_create_params(&self.name, self.reuse, create)
    }

    pub fn try_get_or_create_params<F, I, E>(self, create: F) -> Result<SharedParams, E>
    where
        F: FnOnce() -> Result<I, E>,
        I: IntoIterator<Item = f64>,
        E: From<ParamError>,
    {
        self.injector
            .try_get_or_create_params(&self.name, self.reuse, create)
    }

    pub fn params_in_scope(&self) -> Vec<NamedParams> {
        self.injector.params_in_scope(&self.name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("Parameter `{name}` already exists and reuse is forbidden")]
    AlreadyExists { name: String },
    #[error("Parameter `{name}` does not exist and reuse is required")]
    NotFound { name: String },
    #[error("Parameter size not matched: expected {expected}, got {actual}")]
    SizeNotMatched { expected: usize, actual: usize },
}
