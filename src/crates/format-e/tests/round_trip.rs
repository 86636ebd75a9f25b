//! Testable property 1: for every diff `d` producible by `parse_diff`,
//! `parse_diff(serialize_diff(d))` yields a structurally equal diff.

use format_e::{parse_diff, serialize_diff};

const RICH_DIFF: &str = "\
<base_snapshot>Payments@v7</base_snapshot>
<view_context>phase1</view_context>
## Nodes
+ ProcessPayment.FUNC.001|Processes a payment [phase:1, volatility:\"low\", tags:[\"core\",\"billing\"]]
~ ProcessPayment.FUNC.001|Processes a payment, now idempotent [volatility:\"medium\"]
- OldStep.FUNC.002
## Edges
+ ProcessPayment.FUNC.001 -io-> Ledger.SYS.001
- ProcessPayment.FUNC.001 -rel-> Ledger.SYS.001
";

#[test]
fn round_trip_preserves_every_operation() {
    let diff = parse_diff(RICH_DIFF).unwrap();
    let serialized = serialize_diff(&diff);
    let reparsed = parse_diff(&serialized).unwrap();
    assert_eq!(diff, reparsed);
}

#[test]
fn round_trip_is_stable_under_a_second_pass() {
    let diff = parse_diff(RICH_DIFF).unwrap();
    let once = serialize_diff(&diff);
    let twice = serialize_diff(&parse_diff(&once).unwrap());
    assert_eq!(once, twice);
}
