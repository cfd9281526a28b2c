//! Name-indexed tables owned by one worker. Entries live in per-table
//! arenas; the name tree anchors them through integer handles, so no table
//! holds an owning reference into another.

pub mod cs;
pub mod cs_policy;
pub mod cs_policy_lru;
pub mod fib;
pub mod measurements;
pub mod name_tree;
pub mod pit;
pub mod strategy_choice;

use anyhow::Result;

use crate::config::ForwarderConfig;

/// Handle into the name tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Handle into the FIB arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FibEntryId(pub(crate) usize);

/// Handle into the Content Store arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CsEntryId(pub(crate) usize);

/// Handle into the PIT arena. Ordered so timer heaps can carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PitEntryId(pub(crate) usize);

/// Handle into the measurements arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasurementsEntryId(pub(crate) usize);

/// Handle into the strategy choice arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyChoiceEntryId(pub(crate) usize);

/// All tables of one worker, created and torn down together.
pub struct Tables {
    pub name_tree: name_tree::NameTree,
    pub fib: fib::Fib,
    pub cs: cs::Cs,
    pub pit: pit::Pit,
    pub measurements: measurements::Measurements,
    pub strategy_choice: strategy_choice::StrategyChoice,
}

impl Tables {
    pub fn new(config: &ForwarderConfig, default_strategy_instance: mwfd_core::Name) -> Result<Self> {
        let mut name_tree = name_tree::NameTree::new();
        let fib = fib::Fib::new(&mut name_tree);
        let cs = cs::Cs::new(&config.cs)?;
        let pit = pit::Pit::new(config.pit_capacity);
        let measurements = measurements::Measurements::new();
        let strategy_choice =
            strategy_choice::StrategyChoice::new(&mut name_tree, default_strategy_instance);
        Ok(Self {
            name_tree,
            fib,
            cs,
            pit,
            measurements,
            strategy_choice,
        })
    }
}
