//! Operator kernels: window, group-by, join, flatten/combine, eval-family,
//! aggregation/selector/change operators, and autoscale (spec §4.3–§4.6,
//! §4.8). Everything here is synchronous and `tokio`-free; the async loop
//! that drives an `Operator` off a real edge lives in `flowd::taskmaster`.

pub mod aggregate;
pub mod autoscale;
pub mod change;
pub mod combine;
pub mod eval;
pub mod flatten;
pub mod groupby;
pub mod join;
pub mod lambda;
pub mod operator;
pub mod window;

pub use aggregate::{Aggregate, Percentile, Reducer, TopK};
pub use autoscale::{Autoscale, ReplicaController};
pub use change::{
    ChangeDetect, CumulativeSum, Derivative, Difference, Elapsed, HoltWinters, MovingAverage, StateCount,
    StateDuration,
};
pub use combine::{Combine, CombinePosition};
pub use eval::{DefaultFields, Delete, Eval, Shift, Where};
pub use flatten::Flatten;
pub use groupby::GroupBy;
pub use join::{FillPolicy, Join, JoinSpec};
pub use lambda::{render_template, EvalError, Expr};
pub use operator::Operator;
pub use window::{Window, WindowSpec};
