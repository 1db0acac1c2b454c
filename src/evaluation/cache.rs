use crate::errors::ResponseError;
use crate::evaluation::StateIndex;
use enum_as_inner::EnumAsInner;
use hashbrown::HashMap;
use ndarray::prelude::*;
use num_complex::Complex64;
use once_cell::sync::OnceCell;
use responsefun_backend::OperatorComponent;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Bit pattern of a complex frequency (or shift). Positive and negative zero are treated
/// as the same value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrequencyKey {
    re: u64,
    im: u64,
}

impl From<Complex64> for FrequencyKey {
    fn from(value: Complex64) -> Self {
        Self {
            re: (value.re + 0.0).to_bits(),
            im: (value.im + 0.0).to_bits(),
        }
    }
}

impl FrequencyKey {
    pub fn value(&self) -> Complex64 {
        Complex64::new(f64::from_bits(self.re), f64::from_bits(self.im))
    }
}

/// Operator of a cached quantity; the fluctuation flag selects op - <0|op|0>.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperatorRef {
    pub component: OperatorComponent,
    pub fluctuation: bool,
}

/// Bra or ket of a cached quantity. `Summed` stands for the (implicit) sum over all excited
/// states, i.e. a vector in the space of intermediate states, and `Complement` for the
/// same sum without the listed excited states. `Vector` is a previously computed vector,
/// identified by its own key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateRef {
    Ground,
    Excited(usize),
    Summed,
    Complement(Vec<usize>),
    Vector(Box<CacheKey>),
}

impl From<StateIndex> for StateRef {
    fn from(state: StateIndex) -> Self {
        match state {
            StateIndex::Ground => StateRef::Ground,
            StateIndex::Excited(n) => StateRef::Excited(n),
        }
    }
}

/// Full description of a cached quantity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operator: Option<OperatorRef>,
    pub bra: StateRef,
    pub ket: StateRef,
    /// Shift of a response equation.
    pub frequency: Option<FrequencyKey>,
}

impl CacheKey {
    /// <bra|op|ket>
    pub fn element(component: &OperatorComponent, bra: StateRef, ket: StateRef) -> Self {
        Self::with_operator(component, false, bra, ket)
    }

    pub fn with_operator(
        component: &OperatorComponent,
        fluctuation: bool,
        bra: StateRef,
        ket: StateRef,
    ) -> Self {
        Self {
            operator: Some(OperatorRef {
                component: component.clone(),
                fluctuation,
            }),
            bra,
            ket,
            frequency: None,
        }
    }

    /// Solution of (M + shift) x = v for the vector v with the key `rhs`.
    pub fn response(rhs: CacheKey, shift: Complex64) -> Self {
        Self {
            operator: None,
            bra: StateRef::Summed,
            ket: StateRef::Vector(Box::new(rhs)),
            frequency: Some(FrequencyKey::from(shift)),
        }
    }

    /// The vector with the key `rhs` after projecting out the given excited states.
    pub fn projected(rhs: CacheKey, states: &[usize]) -> Self {
        Self {
            operator: None,
            bra: StateRef::Complement(states.to_vec()),
            ket: StateRef::Vector(Box::new(rhs)),
            frequency: None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op: String = match &self.operator {
            Some(op) if op.fluctuation => format!("{}-<{}>", op.component, op.component),
            Some(op) => op.component.to_string(),
            None => String::from("1"),
        };
        write!(f, "<{:?}|{}|{:?}>", self.bra, op, self.ket)?;
        if let Some(w) = self.frequency {
            write!(f, " at {}", w.value())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, EnumAsInner)]
pub enum CachedValue {
    Scalar(Complex64),
    Vector(Array1<Complex64>),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Cache for matrix elements and response vectors that lives for one evaluation of a
/// response function. Each key is computed at most once, also if several threads ask for
/// the same key at the same time: the first caller computes the value while the others
/// wait for it.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    entries: Mutex<HashMap<CacheKey, Arc<OnceCell<CachedValue>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<CachedValue, ResponseError>
    where
        F: FnOnce() -> Result<CachedValue, ResponseError>,
    {
        // The map is only locked to look up the cell; the value is computed without the lock.
        let cell: Arc<OnceCell<CachedValue>> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let mut computed: bool = false;
        let value: &CachedValue = cell.get_or_try_init(|| {
            computed = true;
            compute()
        })?;
        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value.clone())
    }

    pub fn scalar<F>(&self, key: CacheKey, compute: F) -> Result<Complex64, ResponseError>
    where
        F: FnOnce() -> Result<Complex64, ResponseError>,
    {
        let description: String = key.to_string();
        self.get_or_compute(key, || compute().map(CachedValue::Scalar))?
            .into_scalar()
            .map_err(|_| ResponseError::CacheMismatch(description))
    }

    pub fn vector<F>(&self, key: CacheKey, compute: F) -> Result<Array1<Complex64>, ResponseError>
    where
        F: FnOnce() -> Result<Array1<Complex64>, ResponseError>,
    {
        let description: String = key.to_string();
        self.get_or_compute(key, || compute().map(CachedValue::Vector))?
            .into_vector()
            .map_err(|_| ResponseError::CacheMismatch(description))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drops all cached values.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
