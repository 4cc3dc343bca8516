//! Migration selection.
//!
//! Packs a set of wallet inputs into transaction outputs under the fee
//! policy and size limits described by [`SelectionParameters`], minimizing
//! the ada lost to fee excess. Selections are immutable: every operation
//! consumes parameters and a previous state and returns a fresh value or a
//! [`SelectionError`].

use crate::value::{Coin, Size, TokenBundle, TokenMap, TokenQuantity};

use std::{fmt, num::NonZeroUsize};

/// No output can ever hold more ada than the total supply. Used to assess
/// output sizes with a maximized coin field, so that assigning fee excess to
/// an output can never push it over the per-output size limit afterwards.
pub const MAXIMUM_OUTPUT_COIN: Coin = Coin(45_000_000_000_000_000);

/// The fee and size policy a selection is built against.
///
/// Implementations are expected to be *monotone*: `cost_of_output` and
/// `size_of_output` must not decrease when the coin field grows, and
/// `minimum_ada_quantity_for_output` must not exceed, for a union of token
/// maps, the sum of the per-map minima. The engine refuses to loop on
/// non-conforming policies but makes no promise about the quality of the
/// resulting selection.
pub trait SelectionParameters {
    type Size: Size;

    fn cost_of_empty_selection(&self) -> Coin;

    fn cost_of_input(&self) -> Coin;

    fn cost_of_output(&self, output: &TokenBundle) -> Coin;

    fn cost_of_reward_withdrawal(&self, amount: Coin) -> Coin;

    fn size_of_empty_selection(&self) -> Self::Size;

    fn size_of_input(&self) -> Self::Size;

    fn size_of_output(&self, output: &TokenBundle) -> Self::Size;

    fn size_of_reward_withdrawal(&self, amount: Coin) -> Self::Size;

    fn maximum_size_of_output(&self) -> Self::Size;

    fn maximum_size_of_selection(&self) -> Self::Size;

    /// The largest quantity of a single asset one output may hold. Larger
    /// holdings are split across several outputs.
    fn maximum_token_quantity(&self) -> TokenQuantity;

    /// The protocol rule tying the minimum ada content of an output to the
    /// assets it carries.
    fn minimum_ada_quantity_for_output(&self, tokens: &TokenMap) -> Coin;
}

/// A packed selection, ready to become a transaction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<I, S> {
    /// The consumed inputs, most recently added first. Never empty.
    pub inputs: Vec<(I, TokenBundle)>,
    /// The produced outputs. Never empty.
    pub outputs: Vec<TokenBundle>,
    /// Ada beyond the minimum required fee that could not profitably be
    /// assigned to any output.
    pub fee_excess: Coin,
    /// Total size, cached. Equals the empty-selection size plus the sizes
    /// of every input, every output and the reward withdrawal.
    pub size: S,
    /// The reward amount withdrawn by this selection.
    pub reward_withdrawal: Coin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError<S> {
    /// The ada supplied by the inputs and the reward withdrawal cannot cover
    /// the fees and per-output minimum ada quantities of any feasible
    /// arrangement.
    AdaInsufficient,
    /// Even the tightest arrangement exceeds a size limit.
    Full {
        size_maximum: S,
        size_required: S,
    },
}

impl<S: fmt::Display> fmt::Display for SelectionError<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AdaInsufficient => write!(
                f,
                "Insufficient ada to cover the fee and minimum ada quantities."
            ),
            Self::Full {
                size_maximum,
                size_required,
            } => write!(
                f,
                "Selection too large: needs size {} but the maximum is {}.",
                size_required, size_maximum
            ),
        }
    }
}

impl<S: fmt::Display + fmt::Debug> std::error::Error for SelectionError<S> {}

/// Outcome of [`check_invariant`]. Anything but `Holds` indicates a bug in
/// the engine, never a user error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInvariantStatus<S> {
    Holds,
    /// The ada on the input side does not equal outputs plus fee plus
    /// excess.
    AdaBalanceIncorrect,
    /// The multi-asset content of inputs and outputs differs.
    TokenBalanceIncorrect,
    /// An output carries less ada than the protocol minimum for its assets.
    OutputBelowMinimumAdaQuantity,
    /// An output exceeds the per-output size limit.
    OutputSizeExceedsLimit,
    /// The selection exceeds the overall size limit.
    SizeExceedsLimit { size_maximum: S, size_actual: S },
    /// The cached size field disagrees with a recomputation.
    SizeIncorrect { size_cached: S, size_actual: S },
    /// Some of the fee excess could still profitably be assigned to an
    /// output.
    FeeExcessNotMinimized,
}

/// Outcome of a successful [`reclaim_ada`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimAdaResult<S> {
    /// The outputs after coin reduction and merging. Token content is
    /// preserved exactly; the count never grows.
    pub reduced_outputs: Vec<TokenBundle>,
    /// How much less the reduced outputs cost in fees.
    pub cost_reduction: Coin,
    /// How much smaller the reduced outputs are.
    pub size_reduction: S,
}

/// Whether this output fits the per-output size limit at its actual value.
pub fn output_size_within_limit<P: SelectionParameters>(params: &P, output: &TokenBundle) -> bool {
    params.size_of_output(output) <= params.maximum_size_of_output()
}

/// Whether this output satisfies the minimum ada quantity for its assets.
pub fn output_satisfies_minimum_ada_quantity<P: SelectionParameters>(
    params: &P,
    output: &TokenBundle,
) -> bool {
    output.coin >= params.minimum_ada_quantity_for_output(&output.tokens)
}

// The working predicate for building outputs: size is assessed with the
// coin field maximized, so later fee-excess assignment cannot invalidate
// the output, and no single asset quantity may exceed the per-output cap.
fn output_within_limits<P: SelectionParameters>(params: &P, output: &TokenBundle) -> bool {
    params.size_of_output(&output.with_coin(MAXIMUM_OUTPUT_COIN))
        <= params.maximum_size_of_output()
        && output.tokens.max_quantity() <= params.maximum_token_quantity()
}

// Evidence for a `Full` error caused by a single unabsorbable output. A
// merge blocked by size reports the offending size directly; one blocked
// only by the token-quantity cap is pushed past the limit so the reported
// requirement always exceeds the maximum.
fn oversize_evidence<P: SelectionParameters>(
    params: &P,
    output: &TokenBundle,
) -> SelectionError<P::Size> {
    let size_maximum = params.maximum_size_of_output();
    let size = params.size_of_output(&output.with_coin(MAXIMUM_OUTPUT_COIN));
    let size_required = if size > size_maximum {
        size
    } else {
        size_maximum.add(&size)
    };
    SelectionError::Full {
        size_maximum,
        size_required,
    }
}

fn total_fee<P: SelectionParameters>(
    params: &P,
    input_count: usize,
    outputs: &[TokenBundle],
    reward_withdrawal: Coin,
) -> Coin {
    let inputs_cost = Coin(
        params
            .cost_of_input()
            .0
            .checked_mul(input_count as u64)
            .expect("input cost overflow"),
    );
    let outputs_cost: Coin = outputs.iter().map(|o| params.cost_of_output(o)).sum();
    params.cost_of_empty_selection()
        + inputs_cost
        + outputs_cost
        + params.cost_of_reward_withdrawal(reward_withdrawal)
}

fn total_size<P: SelectionParameters>(
    params: &P,
    input_count: usize,
    outputs: &[TokenBundle],
    reward_withdrawal: Coin,
) -> P::Size {
    let mut size = params.size_of_empty_selection();
    for _ in 0..input_count {
        size = size.add(&params.size_of_input());
    }
    for output in outputs {
        size = size.add(&params.size_of_output(output));
    }
    size.add(&params.size_of_reward_withdrawal(reward_withdrawal))
}

/// Create a selection consuming all of `inputs` and withdrawing
/// `reward_withdrawal`.
///
/// The union of the inputs' token maps is spread over as few outputs as the
/// per-output limits allow, each output is topped up to its minimum ada
/// quantity, and whatever ada remains after fees is assigned back to the
/// outputs while doing so is cheaper than leaving it as fee excess.
pub fn create<I, P: SelectionParameters>(
    params: &P,
    reward_withdrawal: Coin,
    inputs: Vec<(I, TokenBundle)>,
) -> Result<Selection<I, P::Size>, SelectionError<P::Size>> {
    assert!(!inputs.is_empty(), "a selection needs at least one input");

    let mut maps = Vec::new();
    for (_, bundle) in &inputs {
        if !bundle.tokens.is_empty() {
            split_output_tokens(params, &bundle.tokens, &mut maps)?;
        }
    }
    let outputs = if maps.is_empty() {
        // Pure-ada migration: a single output carries everything.
        let tokens = TokenMap::empty();
        let coin = params.minimum_ada_quantity_for_output(&tokens);
        vec![TokenBundle::new(coin, tokens)]
    } else {
        let bundles = maps
            .into_iter()
            .map(|tokens| {
                let coin = params.minimum_ada_quantity_for_output(&tokens);
                TokenBundle::new(coin, tokens)
            })
            .collect();
        let coalesced = coalesce_outputs(params, bundles);
        // A merged output's own minimum may be below the sum of its parts'.
        coalesced
            .into_iter()
            .map(|output| {
                let coin = params.minimum_ada_quantity_for_output(&output.tokens);
                output.with_coin(coin)
            })
            .collect()
    };
    assemble(params, inputs, reward_withdrawal, outputs)
}

/// Merge a new input into one of the selection's existing outputs: the
/// first one, in output order, that can absorb the input's tokens within
/// the per-output limits.
pub fn add_input_to_existing_output<I: Clone, P: SelectionParameters>(
    params: &P,
    selection: &Selection<I, P::Size>,
    input: (I, TokenBundle),
) -> Result<Selection<I, P::Size>, SelectionError<P::Size>> {
    let (input_id, input_bundle) = input;
    let mut chosen = None;
    for (index, output) in selection.outputs.iter().enumerate() {
        let merged = output.add(&input_bundle);
        if output_within_limits(params, &merged) {
            chosen = Some((index, merged));
            break;
        }
    }
    let (index, merged) = match chosen {
        Some(found) => found,
        None => {
            let size_maximum = params.maximum_size_of_output();
            let size_required = selection
                .outputs
                .iter()
                .map(|output| {
                    let merged = output.add(&input_bundle);
                    let size = params.size_of_output(&merged.with_coin(MAXIMUM_OUTPUT_COIN));
                    if size > size_maximum {
                        size
                    } else {
                        // Blocked by the token-quantity cap alone; report
                        // past the limit so the evidence stays strict.
                        size_maximum.add(&size)
                    }
                })
                .min()
                .expect("selection outputs are never empty");
            return Err(SelectionError::Full {
                size_maximum,
                size_required,
            });
        }
    };

    let mut inputs = selection.inputs.clone();
    inputs.insert(0, (input_id, input_bundle));
    let mut outputs = selection.outputs.clone();
    let floor = params.minimum_ada_quantity_for_output(&merged.tokens);
    outputs[index] = merged.with_coin(floor);
    assemble(params, inputs, selection.reward_withdrawal, outputs)
}

/// Append a new output holding exactly the new input's bundle. The output's
/// minimum ada quantity must be covered by the input's own coin; ada is
/// never taken back from the existing outputs.
pub fn add_input_to_new_output_without_reclaiming_ada<I: Clone, P: SelectionParameters>(
    params: &P,
    selection: &Selection<I, P::Size>,
    input: (I, TokenBundle),
) -> Result<Selection<I, P::Size>, SelectionError<P::Size>> {
    let (input_id, input_bundle) = input;
    if !output_within_limits(params, &input_bundle) {
        return Err(oversize_evidence(params, &input_bundle));
    }
    let floor = params.minimum_ada_quantity_for_output(&input_bundle.tokens);
    if input_bundle.coin < floor {
        return Err(SelectionError::AdaInsufficient);
    }
    let mut inputs = selection.inputs.clone();
    let mut outputs = selection.outputs.clone();
    outputs.push(TokenBundle::new(floor, input_bundle.tokens.clone()));
    inputs.insert(0, (input_id, input_bundle));
    assemble(params, inputs, selection.reward_withdrawal, outputs)
}

/// Append a new output holding the new input's bundle, reclaiming ada from
/// the existing outputs if the input's coin alone cannot pay for the new
/// output and the fee increase.
pub fn add_input_to_new_output<I: Clone, P: SelectionParameters>(
    params: &P,
    selection: &Selection<I, P::Size>,
    input: (I, TokenBundle),
) -> Result<Selection<I, P::Size>, SelectionError<P::Size>> {
    let (input_id, input_bundle) = input;
    if !output_within_limits(params, &input_bundle) {
        return Err(oversize_evidence(params, &input_bundle));
    }
    let floor = params.minimum_ada_quantity_for_output(&input_bundle.tokens);
    let new_output = TokenBundle::new(floor, input_bundle.tokens.clone());

    let mut inputs = selection.inputs.clone();
    inputs.insert(0, (input_id, input_bundle));
    let mut outputs = selection.outputs.clone();
    outputs.push(new_output.clone());

    let available: Coin = inputs.iter().map(|(_, bundle)| bundle.coin).sum::<Coin>()
        + selection.reward_withdrawal;
    let required = outputs.iter().map(|o| o.coin).sum::<Coin>()
        + total_fee(params, inputs.len(), &outputs, selection.reward_withdrawal);
    if available >= required {
        return assemble(params, inputs, selection.reward_withdrawal, outputs);
    }

    // Not enough ada as-is: free the shortfall from the existing outputs.
    let target = required.saturating_sub(available);
    log::debug!(
        "Input cannot pay its way into a new output, reclaiming {} from {} outputs.",
        target,
        selection.outputs.len()
    );
    let reclaimed = match reclaim_ada(params, target, &selection.outputs) {
        Some(reclaimed) => reclaimed,
        None => return Err(SelectionError::AdaInsufficient),
    };
    let mut outputs = reclaimed.reduced_outputs;
    outputs.push(new_output);
    assemble(params, inputs, selection.reward_withdrawal, outputs)
}

/// Greedily merge a sequence of outputs, left to right, accumulating into
/// the current output for as long as the merge stays within the per-output
/// limits. Total value is preserved and the count never grows.
pub fn coalesce_outputs<P: SelectionParameters>(
    params: &P,
    outputs: Vec<TokenBundle>,
) -> Vec<TokenBundle> {
    assert!(!outputs.is_empty(), "cannot coalesce zero outputs");
    let mut iter = outputs.into_iter();
    let mut coalesced = vec![iter.next().expect("just checked for emptiness")];
    for output in iter {
        let last = coalesced.last_mut().expect("starts non-empty");
        let merged = last.add(&output);
        if output_within_limits(params, &merged) {
            *last = merged;
        } else {
            coalesced.push(output);
        }
    }
    coalesced
}

/// Assign fee excess to an output's coin field for as long as the marginal
/// cost of one more atom is strictly below the remaining excess.
///
/// Returns the remaining excess and the grown output. The coin increase
/// plus the output cost increase plus the remaining excess always equals
/// the original excess.
pub fn minimize_fee_excess_for_output<P: SelectionParameters>(
    params: &P,
    fee_excess: Coin,
    output: TokenBundle,
) -> (Coin, TokenBundle) {
    let mut fee_excess = fee_excess;
    let mut output = output;

    // Coarse pass: assume the worst-case cost increase for assigning the
    // whole excess, assign the remainder in one step, repeat to a fixed
    // point. This keeps the loop count independent of the excess amount.
    loop {
        if fee_excess.is_zero() {
            break;
        }
        let cost_current = params.cost_of_output(&output);
        let cost_maximized = params.cost_of_output(&output.with_coin(output.coin + fee_excess));
        let cost_increase_bound = cost_maximized.saturating_sub(cost_current);
        let coin_increase = match fee_excess.checked_sub(cost_increase_bound) {
            Some(increase) if !increase.is_zero() => increase,
            _ => break,
        };
        let candidate = output.with_coin(output.coin + coin_increase);
        let cost_increase = params.cost_of_output(&candidate).saturating_sub(cost_current);
        match fee_excess
            .checked_sub(coin_increase)
            .and_then(|rest| rest.checked_sub(cost_increase))
        {
            // Refuse non-progress steps so a non-monotone cost function
            // cannot make us loop.
            Some(rest) if rest < fee_excess => {
                output = candidate;
                fee_excess = rest;
            }
            _ => break,
        }
    }

    // Fine pass: single atoms until the marginal cost catches up with the
    // excess.
    loop {
        if fee_excess.is_zero() {
            break;
        }
        let cost_current = params.cost_of_output(&output);
        let bumped = output.with_coin(output.coin + Coin(1));
        let marginal = params.cost_of_output(&bumped).saturating_sub(cost_current);
        if marginal >= fee_excess {
            break;
        }
        fee_excess = Coin(fee_excess.0 - 1 - marginal.0);
        output = bumped;
    }

    (fee_excess, output)
}

// Fold the excess over every output in order. Any output left unprocessed
// is only skipped once the excess has hit zero, so the minimality invariant
// holds for all of them.
fn minimize_fee_excess<P: SelectionParameters>(
    params: &P,
    mut fee_excess: Coin,
    outputs: &mut [TokenBundle],
) -> Coin {
    for output in outputs.iter_mut() {
        if fee_excess.is_zero() {
            break;
        }
        let (remaining, updated) =
            minimize_fee_excess_for_output(params, fee_excess, output.clone());
        *output = updated;
        fee_excess = remaining;
    }
    fee_excess
}

/// The ada that could be freed from this output alone: the coin above the
/// minimum ada quantity, plus the fee saved by shrinking the coin field.
pub fn excess_ada_for_output<P: SelectionParameters>(params: &P, output: &TokenBundle) -> Coin {
    let floor = params.minimum_ada_quantity_for_output(&output.tokens);
    let reduced = output.with_coin(floor);
    output.coin.saturating_sub(floor)
        + params
            .cost_of_output(output)
            .saturating_sub(params.cost_of_output(&reduced))
}

/// Try to free at least `target` ada from the given outputs, first by
/// stripping every output down to its minimum ada quantity, then, if that
/// is not enough, by merging outputs to save on per-output costs.
///
/// On success the token content is preserved exactly, the output count
/// never grows, and the reclaimed ada (coin reduction plus cost reduction)
/// covers the target. A zero target trivially succeeds with no reductions.
pub fn reclaim_ada<P: SelectionParameters>(
    params: &P,
    target: Coin,
    outputs: &[TokenBundle],
) -> Option<ReclaimAdaResult<P::Size>> {
    if target.is_zero() {
        return Some(ReclaimAdaResult {
            reduced_outputs: outputs.to_vec(),
            cost_reduction: Coin::ZERO,
            size_reduction: P::Size::zero(),
        });
    }
    assert!(!outputs.is_empty(), "cannot reclaim ada from zero outputs");

    let coin_before: Coin = outputs.iter().map(|o| o.coin).sum();
    let cost_before: Coin = outputs.iter().map(|o| params.cost_of_output(o)).sum();
    let size_before = outputs
        .iter()
        .fold(P::Size::zero(), |acc, o| acc.add(&params.size_of_output(o)));

    let strip = |outputs: &[TokenBundle]| -> Vec<TokenBundle> {
        outputs
            .iter()
            .map(|output| {
                let floor = params.minimum_ada_quantity_for_output(&output.tokens);
                // Reclaiming must never add ada to an output.
                output.with_coin(std::cmp::min(floor, output.coin))
            })
            .collect()
    };
    let reclaimed = |reduced: &[TokenBundle]| -> Coin {
        let coin_after: Coin = reduced.iter().map(|o| o.coin).sum();
        let cost_after: Coin = reduced.iter().map(|o| params.cost_of_output(o)).sum();
        coin_before.saturating_sub(coin_after) + cost_before.saturating_sub(cost_after)
    };

    let mut reduced = strip(outputs);
    if reclaimed(&reduced) < target {
        // Coin reductions alone are not enough: merge outputs to shed
        // per-output overhead, then strip the merged outputs again.
        reduced = strip(&coalesce_outputs(params, reduced));
        if reclaimed(&reduced) < target {
            return None;
        }
    }

    let cost_after: Coin = reduced.iter().map(|o| params.cost_of_output(o)).sum();
    let size_after = reduced
        .iter()
        .fold(P::Size::zero(), |acc, o| acc.add(&params.size_of_output(o)));
    Some(ReclaimAdaResult {
        reduced_outputs: reduced,
        cost_reduction: cost_before.saturating_sub(cost_after),
        size_reduction: size_before.distance(&size_after),
    })
}

/// Verify every selection invariant. Returns the first violation found, or
/// `Holds`. Meant for tests and debug assertions; a violation is a bug.
pub fn check_invariant<I, P: SelectionParameters>(
    params: &P,
    selection: &Selection<I, P::Size>,
) -> SelectionInvariantStatus<P::Size> {
    let available: Coin = selection
        .inputs
        .iter()
        .map(|(_, bundle)| bundle.coin)
        .sum::<Coin>()
        + selection.reward_withdrawal;
    let fee = total_fee(
        params,
        selection.inputs.len(),
        &selection.outputs,
        selection.reward_withdrawal,
    );
    let committed: Coin = selection.outputs.iter().map(|o| o.coin).sum();
    if available != committed + fee + selection.fee_excess {
        return SelectionInvariantStatus::AdaBalanceIncorrect;
    }

    let tokens_in = selection
        .inputs
        .iter()
        .fold(TokenMap::empty(), |acc, (_, bundle)| acc.add(&bundle.tokens));
    let tokens_out = selection
        .outputs
        .iter()
        .fold(TokenMap::empty(), |acc, output| acc.add(&output.tokens));
    if tokens_in != tokens_out {
        return SelectionInvariantStatus::TokenBalanceIncorrect;
    }

    for output in &selection.outputs {
        if !output_satisfies_minimum_ada_quantity(params, output) {
            return SelectionInvariantStatus::OutputBelowMinimumAdaQuantity;
        }
        if !output_size_within_limit(params, output) {
            return SelectionInvariantStatus::OutputSizeExceedsLimit;
        }
    }

    let size_actual = total_size(
        params,
        selection.inputs.len(),
        &selection.outputs,
        selection.reward_withdrawal,
    );
    if size_actual != selection.size {
        return SelectionInvariantStatus::SizeIncorrect {
            size_cached: selection.size.clone(),
            size_actual,
        };
    }
    let size_maximum = params.maximum_size_of_selection();
    if size_actual > size_maximum {
        return SelectionInvariantStatus::SizeExceedsLimit {
            size_maximum,
            size_actual,
        };
    }

    for output in &selection.outputs {
        let cost_current = params.cost_of_output(output);
        let bumped = output.with_coin(output.coin + Coin(1));
        let marginal = params.cost_of_output(&bumped).saturating_sub(cost_current);
        if marginal < selection.fee_excess {
            return SelectionInvariantStatus::FeeExcessNotMinimized;
        }
    }

    SelectionInvariantStatus::Holds
}

// Split a token map into chunks which each fit into one output: no asset
// quantity above the per-output cap, and a size within the per-output limit
// once the chunk sits in an output at its minimum ada quantity.
fn split_output_tokens<P: SelectionParameters>(
    params: &P,
    tokens: &TokenMap,
    chunks: &mut Vec<TokenMap>,
) -> Result<(), SelectionError<P::Size>> {
    let cap = params.maximum_token_quantity();
    assert!(!cap.is_zero(), "a zero token quantity cap admits no tokens");
    let quantity_bounded = if tokens.max_quantity() > cap {
        let count = ((tokens.max_quantity().0 - 1) / cap.0 + 1) as usize;
        log::debug!(
            "Splitting a token map with quantity {} above the cap {} into {} parts.",
            tokens.max_quantity(),
            cap,
            count
        );
        tokens
            .equipartition(NonZeroUsize::new(count).expect("count is at least one"))
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect()
    } else {
        vec![tokens.clone()]
    };
    for part in quantity_bounded {
        split_by_size(params, part, chunks)?;
    }
    Ok(())
}

fn split_by_size<P: SelectionParameters>(
    params: &P,
    tokens: TokenMap,
    chunks: &mut Vec<TokenMap>,
) -> Result<(), SelectionError<P::Size>> {
    let coin = params.minimum_ada_quantity_for_output(&tokens);
    let bundle = TokenBundle::new(coin, tokens.clone());
    if output_within_limits(params, &bundle) {
        chunks.push(tokens);
        return Ok(());
    }
    let halves = tokens.equipartition(NonZeroUsize::new(2).expect("two is not zero"));
    if halves.iter().any(|half| half == &tokens) {
        // Indivisible and still too big: no output can ever hold it.
        return Err(oversize_evidence(params, &bundle));
    }
    for half in halves {
        if !half.is_empty() {
            split_by_size(params, half, chunks)?;
        }
    }
    Ok(())
}

// Attach coins to a worked-out set of outputs: check the arrangement fits
// the selection size limit, check the ada adds up, then hand the excess
// back to the outputs. The caller guarantees every output already carries
// at least its minimum ada quantity.
fn assemble<I, P: SelectionParameters>(
    params: &P,
    inputs: Vec<(I, TokenBundle)>,
    reward_withdrawal: Coin,
    mut outputs: Vec<TokenBundle>,
) -> Result<Selection<I, P::Size>, SelectionError<P::Size>> {
    let size_maximum = params.maximum_size_of_selection();
    let size_required = total_size(params, inputs.len(), &outputs, reward_withdrawal);
    if size_required > size_maximum {
        return Err(SelectionError::Full {
            size_maximum,
            size_required,
        });
    }

    let available: Coin =
        inputs.iter().map(|(_, bundle)| bundle.coin).sum::<Coin>() + reward_withdrawal;
    let fee = total_fee(params, inputs.len(), &outputs, reward_withdrawal);
    let committed: Coin = outputs.iter().map(|o| o.coin).sum();
    let fee_excess = match available.checked_sub(committed + fee) {
        Some(excess) => excess,
        None => return Err(SelectionError::AdaInsufficient),
    };
    let fee_excess = minimize_fee_excess(params, fee_excess, &mut outputs);

    // Coin growth grows output encodings, so the limit gets a second look.
    let size = total_size(params, inputs.len(), &outputs, reward_withdrawal);
    if size > size_maximum {
        return Err(SelectionError::Full {
            size_maximum,
            size_required: size,
        });
    }

    Ok(Selection {
        inputs,
        outputs,
        fee_excess,
        size,
        reward_withdrawal,
    })
}
