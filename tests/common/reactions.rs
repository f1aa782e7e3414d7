//! Table-driven reactors for the fixture experiments.

#![allow(dead_code)]

use del_library::chemistry::MockReactor;

pub fn single_step_reactor() -> MockReactor {
    MockReactor::new().with_rule("[A].[B]>>[P1]", &["[A]", "[B]"], &["P1(A+B)"])
}

pub fn unsourced_intermediate_reactor() -> MockReactor {
    MockReactor::new().with_rule("[A].[B]>>[P1]", &["[B]", "[C]"], &["P1(B+C)"])
}

/// Reactant lists are sorted by node name: `A` before `B0`, `B1` before `P2`.
pub fn linear_reactor() -> MockReactor {
    MockReactor::new()
        .with_rule("t1", &["[A]", "[b0]"], &["P1s"])
        .with_rule("t3", &["[c0]", "P1s"], &["P3-0"])
        .with_rule("t3", &["[c1]", "P1s"], &["P3-1"])
}
