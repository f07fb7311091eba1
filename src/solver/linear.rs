//! Reduced conductance system assembly and solve.
//!
//! Fixed-voltage nodes are eliminated by substitution: for a resistor of
//! conductance `g` between unknown `i` and source `s`, `g` lands on the
//! diagonal of `i` and `g * V(s)` moves to the right-hand side. The reduced
//! matrix is the Laplacian of the unknown subgraph plus those boundary
//! terms, which is symmetric positive definite when every unknown reaches a
//! source.
//!
//! The mesh numbers nodes level by level, so via-coupled unknowns sit a whole
//! level apart. The direct solver factors the matrix under a reverse
//! Cuthill-McKee permutation to keep fill near the diagonal.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use tracing::{debug, info};

use super::{AUTO_DIRECT_LIMIT, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::error::{IrError, Result};
use crate::mesh::{GMat, NodeIdx};

/// Linear solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SolverKind {
    /// Sparse Cholesky factorization
    Direct,
    /// Jacobi-preconditioned conjugate gradient
    #[cfg_attr(feature = "cli", value(name = "cg"))]
    ConjugateGradient,
    /// Direct up to a size threshold, conjugate gradient beyond
    #[default]
    Auto,
}

impl SolverKind {
    /// The concrete method for a system of `unknowns`.
    pub fn resolve(self, unknowns: usize) -> SolverKind {
        match self {
            SolverKind::Auto if unknowns <= AUTO_DIRECT_LIMIT => SolverKind::Direct,
            SolverKind::Auto => SolverKind::ConjugateGradient,
            other => other,
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Direct => write!(f, "direct"),
            SolverKind::ConjugateGradient => write!(f, "cg"),
            SolverKind::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for SolverKind {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "direct" | "cholesky" => Ok(SolverKind::Direct),
            "cg" | "pcg" | "conjugate-gradient" => Ok(SolverKind::ConjugateGradient),
            "auto" => Ok(SolverKind::Auto),
            other => Err(IrError::config(format!("unknown solver '{}'", other))),
        }
    }
}

/// Iterative solver settings.
#[derive(Debug, Clone, Copy)]
pub struct LinearOptions {
    pub kind: SolverKind,
    /// Relative residual target for conjugate gradient
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            kind: SolverKind::Auto,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// What the solve did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    pub unknowns: usize,
    pub nonzeros: usize,
    pub method: SolverKind,
    /// Conjugate gradient iterations; zero for the direct method
    pub iterations: usize,
}

/// The reduced system `G' V' = J'`.
pub struct ReducedSystem {
    pub matrix: CscMatrix<f64>,
    pub rhs: DVector<f64>,
    /// Node index of each unknown
    pub unknown_nodes: Vec<usize>,
}

/// Assemble the reduced system over `reachable` non-source nodes.
pub fn assemble(gmat: &GMat, reachable: &[bool]) -> ReducedSystem {
    let mut slot = vec![usize::MAX; gmat.num_nodes()];
    let mut unknown_nodes = Vec::new();
    for node in gmat.nodes() {
        if reachable[node.idx.0] && !node.is_source() {
            slot[node.idx.0] = unknown_nodes.len();
            unknown_nodes.push(node.idx.0);
        }
    }

    let n = unknown_nodes.len();
    let mut rhs = DVector::zeros(n);
    for (i, &node) in unknown_nodes.iter().enumerate() {
        rhs[i] = gmat.nodes()[node].current;
    }

    let mut coo = CooMatrix::new(n, n);
    for edge in gmat.edges() {
        let g = edge.conductance;
        let (a, b) = (edge.a.0, edge.b.0);
        let (sa, sb) = (slot[a], slot[b]);
        match (sa != usize::MAX, sb != usize::MAX) {
            (true, true) => {
                coo.push(sa, sa, g);
                coo.push(sb, sb, g);
                coo.push(sa, sb, -g);
                coo.push(sb, sa, -g);
            }
            (true, false) => {
                if let Some(v) = gmat.nodes()[b].source {
                    coo.push(sa, sa, g);
                    rhs[sa] += g * v;
                }
            }
            (false, true) => {
                if let Some(v) = gmat.nodes()[a].source {
                    coo.push(sb, sb, g);
                    rhs[sb] += g * v;
                }
            }
            (false, false) => {}
        }
    }

    ReducedSystem {
        matrix: CscMatrix::from(&coo),
        rhs,
        unknown_nodes,
    }
}

/// Solve for node voltages and write them into the mesh.
///
/// Sources keep their fixed voltage; nodes outside `reachable` get NaN.
pub fn solve_voltages(gmat: &mut GMat, reachable: &[bool], options: &LinearOptions) -> Result<SolveStats> {
    let started = Instant::now();
    let system = assemble(gmat, reachable);
    let unknowns = system.unknown_nodes.len();
    let method = options.kind.resolve(unknowns);
    debug!(unknowns, nonzeros = system.matrix.nnz(), %method, "assembled reduced system");

    let (solution, iterations) = if unknowns == 0 {
        (DVector::zeros(0), 0)
    } else {
        match method {
            SolverKind::ConjugateGradient => {
                conjugate_gradient(&system.matrix, &system.rhs, options.tolerance, options.max_iterations)?
            }
            _ => (cholesky(&system.matrix, &system.rhs)?, 0),
        }
    };

    let mut unknown_of = vec![None; gmat.num_nodes()];
    for (i, &node) in system.unknown_nodes.iter().enumerate() {
        unknown_of[node] = Some(i);
    }
    for (idx, slot) in unknown_of.into_iter().enumerate() {
        let node = gmat.node_mut(NodeIdx(idx));
        node.voltage = match (node.source, slot) {
            (Some(v), _) => v,
            (None, Some(i)) => solution[i],
            (None, None) => f64::NAN,
        };
    }

    info!(
        unknowns,
        %method,
        iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "solved conductance system"
    );
    Ok(SolveStats {
        unknowns,
        nonzeros: system.matrix.nnz(),
        method,
        iterations,
    })
}

/// Reverse Cuthill-McKee ordering of a symmetric matrix.
///
/// `perm[i]` is the original row placed at position `i`. Each connected
/// component is started from its lowest-degree row.
pub fn rcm_ordering(matrix: &CscMatrix<f64>) -> Vec<usize> {
    let n = matrix.nrows();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (row, col, _) in matrix.triplet_iter() {
        if row != col {
            adj[row].push(col);
        }
    }

    let mut starts: Vec<usize> = (0..n).collect();
    starts.sort_by_key(|&i| adj[i].len());

    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();
    for start in starts {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        while let Some(row) = queue.pop_front() {
            order.push(row);
            let mut next: Vec<usize> = adj[row].iter().copied().filter(|&m| !visited[m]).collect();
            next.sort_by_key(|&m| adj[m].len());
            for m in next {
                visited[m] = true;
                queue.push_back(m);
            }
        }
    }

    order.reverse();
    order
}

/// `P A P^T` for the ordering `perm`.
fn permute(matrix: &CscMatrix<f64>, perm: &[usize]) -> CscMatrix<f64> {
    let n = matrix.nrows();
    let mut position = vec![0; n];
    for (new, &old) in perm.iter().enumerate() {
        position[old] = new;
    }
    let mut coo = CooMatrix::new(n, n);
    for (row, col, &val) in matrix.triplet_iter() {
        coo.push(position[row], position[col], val);
    }
    CscMatrix::from(&coo)
}

fn cholesky(matrix: &CscMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
    let n = matrix.nrows();
    let perm = rcm_ordering(matrix);
    let permuted = permute(matrix, &perm);
    let factor = CscCholesky::factor(&permuted).map_err(|e| IrError::FactorizationFailed {
        unknowns: n,
        message: format!("{:?}", e),
    })?;
    debug!(unknowns = n, factor_nonzeros = factor.l().nnz(), "cholesky factor");

    let b = DMatrix::from_fn(n, 1, |i, _| rhs[perm[i]]);
    let y = factor.solve(&b);
    let mut solution = DVector::zeros(n);
    for (i, &old) in perm.iter().enumerate() {
        solution[old] = y[(i, 0)];
    }
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(IrError::FactorizationFailed {
            unknowns: n,
            message: "solution contains non-finite values".to_string(),
        });
    }
    Ok(solution)
}

/// Sparse matrix-vector product.
fn matvec(matrix: &CscMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(matrix.nrows());
    for (row, col, &val) in matrix.triplet_iter() {
        y[row] += val * x[col];
    }
    y
}

/// Jacobi-preconditioned conjugate gradient.
///
/// Returns the solution and the iteration count.
fn conjugate_gradient(
    matrix: &CscMatrix<f64>,
    rhs: &DVector<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<(DVector<f64>, usize)> {
    let n = matrix.nrows();
    let mut diag = DVector::zeros(n);
    for (row, col, &val) in matrix.triplet_iter() {
        if row == col {
            diag[row] += val;
        }
    }
    if let Some(i) = diag.iter().position(|d| *d <= 0.0) {
        return Err(IrError::FactorizationFailed {
            unknowns: n,
            message: format!("non-positive diagonal at unknown {}", i),
        });
    }
    let precondition = |r: &DVector<f64>| r.component_div(&diag);

    let rhs_norm = rhs.norm();
    let mut x = DVector::zeros(n);
    if rhs_norm == 0.0 {
        return Ok((x, 0));
    }

    let mut r = rhs.clone();
    let mut z = precondition(&r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 0..max_iterations {
        let ap = matvec(matrix, &p);
        let pap = p.dot(&ap);
        if pap <= 0.0 || !pap.is_finite() {
            return Err(IrError::FactorizationFailed {
                unknowns: n,
                message: "matrix is not positive definite".to_string(),
            });
        }
        let alpha = rz / pap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        if r.norm() <= tolerance * rhs_norm {
            return Ok((x, iter + 1));
        }

        z = precondition(&r);
        let rz_next = r.dot(&z);
        let beta = rz_next / rz;
        rz = rz_next;
        p = &z + &p * beta;
    }

    Err(IrError::ConvergenceFailure {
        iterations: max_iterations,
        residual: r.norm() / rhs_norm,
    })
}
