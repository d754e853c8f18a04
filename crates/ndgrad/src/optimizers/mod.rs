//! Parameter update rules.
//!
//! An optimizer is attached to a list of parameter nodes and builds one
//! [`OptimizerParameter`] per node, holding the rule's scratch state. Each
//! [`Optimizer::update`] then walks the adapters:
//!
//! ```text
//! for each adapter:
//!     array = graph[adapter.parameter()]
//!     if array.reduce():              // grad /= train_count, skipped when 0
//!         adapter.update(step, data, grad)
//! ```
//!
//! Gradients are left in place; clear them with
//! [`ComputationGraph::clear_parameter_grads`] before the next accumulation.
//! Calling `update` twice without clearing averages the gradient twice.

mod adam;
mod momentum_sgd;
mod sgd;

pub use adam::{Adam, AdamConfig, AdamParameter};
pub use momentum_sgd::{MomentumSgd, MomentumSgdParameter};
pub use sgd::{Sgd, SgdParameter};

use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::Real;
use std::fmt::Debug;

/// Per-parameter half of an update rule.
pub trait OptimizerParameter: Debug {
    /// The parameter node this adapter updates.
    fn parameter(&self) -> NodeId;

    /// Apply the rule to one parameter. `step` counts the optimizer's
    /// updates, starting at 1.
    fn update(&mut self, step: u64, data: &mut [Real], grad: &[Real]);
}

/// An update rule over a set of parameter nodes.
pub trait Optimizer {
    /// Rule name used in log output.
    fn name(&self) -> &str;

    /// Register parameter nodes; adapters are appended in order.
    ///
    /// # Errors
    ///
    /// - `UnknownNode` / `StaleNode` for ids `graph` does not hold.
    /// - `InvalidArgument` for activation ids, which do not survive
    ///   [`ComputationGraph::clear`].
    fn attach(
        &mut self,
        graph: &ComputationGraph,
        parameters: &[NodeId],
    ) -> Result<(), TensorError>;

    /// Update every attached parameter that accumulated a gradient.
    ///
    /// Returns whether any parameter changed.
    ///
    /// # Errors
    ///
    /// Lookup errors for attached ids.
    fn update(&mut self, graph: &mut ComputationGraph) -> Result<bool, TensorError>;

    /// Number of updates that changed at least one parameter.
    fn update_count(&self) -> u64;

    /// Current learning rate.
    fn learning_rate(&self) -> Real;

    /// Replace the learning rate.
    fn set_learning_rate(&mut self, lr: Real);
}

/// Shared update loop: reduce each parameter's gradient and apply the rule
/// where something was accumulated.
pub(crate) fn update_parameters<P: OptimizerParameter>(
    name: &str,
    graph: &mut ComputationGraph,
    parameters: &mut [P],
    step: u64,
) -> Result<bool, TensorError> {
    let mut updated = 0usize;
    for adapter in parameters.iter_mut() {
        let array = graph.array_mut(adapter.parameter())?;
        if !array.reduce() {
            continue;
        }
        let (data, grad) = array.data_and_grad_mut();
        adapter.update(step, data, grad);
        updated += 1;
    }
    log::debug!(
        "{name} step {step}: updated {updated} of {} parameters",
        parameters.len()
    );
    Ok(updated > 0)
}

/// Element count of each parameter, checking the ids on the way.
pub(crate) fn parameter_lengths(
    graph: &ComputationGraph,
    parameters: &[NodeId],
) -> Result<Vec<usize>, TensorError> {
    parameters
        .iter()
        .map(|&id| {
            let len = graph.array(id)?.data().len();
            if !id.is_parameter() {
                return Err(TensorError::InvalidArgument(format!(
                    "{id:?} is an activation, not a parameter"
                )));
            }
            Ok(len)
        })
        .collect()
}
