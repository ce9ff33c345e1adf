/// Natives for building and inspecting contexts.
pub mod contexts;
/// Natives for control flow: conditionals, loops, throwing, trapping and unwinding.
pub mod control;
/// Natives for making and composing actions.
pub mod functions;
/// Natives for arithmetic.
pub mod math;
/// Natives for blocks and strings.
pub mod series;
/// Natives for talking to the outside world.
pub mod system;
/// Natives for quoting, types and comparison.
pub mod values;

use crate::vm_objects::action::Dispatcher;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A native's name, as spelled in `boot/natives.reb`, and its dispatcher.
pub type NativeInfo = (&'static str, Dispatcher);

static TABLES: &[&[NativeInfo]] = &[
    contexts::NATIVES,
    control::NATIVES,
    functions::NATIVES,
    math::NATIVES,
    series::NATIVES,
    system::NATIVES,
    values::NATIVES,
];

static INDEX: Lazy<HashMap<&'static str, Dispatcher>> = Lazy::new(|| all_natives().collect());

/// Every native dispatcher.
pub fn all_natives() -> impl Iterator<Item = NativeInfo> {
    TABLES.iter().flat_map(|table| table.iter().copied())
}

/// Looks a native's dispatcher up by name.
pub fn get_native(name: &str) -> Option<Dispatcher> {
    INDEX.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn native_names_are_unique() {
        let mut seen = HashSet::new();
        for (name, _) in all_natives() {
            assert!(seen.insert(name), "native {} is defined twice", name);
        }
    }

    #[test]
    fn every_native_in_the_boot_source_has_a_dispatcher() {
        let source = include_str!("../../boot/natives.reb");
        for line in source.lines() {
            let Some((name, rest)) = line.split_once(": native") else { continue };
            assert!(rest.trim_start().starts_with('['), "malformed entry for {}", name);
            assert!(get_native(name.trim()).is_some(), "no dispatcher for {}", name.trim());
        }
    }
}
