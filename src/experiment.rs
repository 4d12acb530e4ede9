//! Experiment driver: clones a scenario template, applies factor
//! configurations, runs replications, and aggregates their result maps (spec
//! component 9).
//!
//! There is no reflective property-path resolver here (spec §9's design
//! note: that is an external collaborator). Instead a [`Configuration`]'s
//! entries are already-resolved setters; the property-path *string* is kept
//! only as the ordering key the spec's apply algorithm requires.

use std::rc::Rc;

use crate::kernel::{Simulation, StopCondition};
use crate::listener::{ResultMap, ResultValue};
use crate::model::Shop;
use crate::utils::prelude::*;

/// One parameterized scenario: the shop to simulate and when to stop.
/// Cloning deep-copies every owned workstation, job source, and job, which is
/// what lets the driver hand each replication an independent run.
#[derive(Clone)]
pub struct Scenario {
    pub shop: Shop,
    pub stop: StopCondition,
}

impl Scenario {
    pub fn new(shop: Shop, stop: StopCondition) -> Self {
        Scenario { shop, stop }
    }

    /// Builds and runs a fresh [`Simulation`] from this scenario, returning
    /// its contributed result map.
    pub fn run(self) -> Result<ResultMap> {
        let mut sim = Simulation::new(self.shop, self.stop);
        sim.init()?;
        sim.run()?;
        let mut results = ResultMap::new();
        sim.contribute_results(&mut results)?;
        Ok(results)
    }
}

/// A procedural configurator applied to a cloned [`Scenario`] in place of a
/// direct property assignment (spec §4.7's `ComplexFactorSetter`).
pub trait ComplexFactorSetter {
    fn configure(&self, scenario: &mut Scenario) -> Result<()>;
}

impl<F> ComplexFactorSetter for F
where
    F: Fn(&mut Scenario) -> Result<()>,
{
    fn configure(&self, scenario: &mut Scenario) -> Result<()> {
        self(scenario)
    }
}

/// One entry in a [`Configuration`]: either resolved eagerly to a setter, or
/// the reserved `@` key naming an alternate clone-source template.
enum Entry {
    Setter(Rc<dyn ComplexFactorSetter>),
    Template(Scenario),
}

/// A property-path-keyed set of factor values that specializes a base
/// scenario. Built by calling [`Configuration::set`] (or
/// [`Configuration::set_template`] for the reserved `@` key) and then handed
/// to [`MultiConfExperiment::add_configuration`].
#[derive(Default)]
pub struct Configuration {
    entries: Vec<(String, Entry)>,
    validate: Option<Rc<dyn Fn(&Scenario) -> bool>>,
}

impl Configuration {
    pub fn new() -> Self {
        Configuration::default()
    }

    /// Registers a setter under `path`. `path` only determines apply order
    /// (spec §4.7(c): ascending key length, ties unspecified — broken here
    /// lexicographically for reproducibility); it is never interpreted as a
    /// real reflective path.
    pub fn set(&mut self, path: impl Into<String>, setter: impl ComplexFactorSetter + 'static) -> &mut Self {
        self.entries.push((path.into(), Entry::Setter(Rc::new(setter))));
        self
    }

    /// Registers the reserved `@` key: `template` is cloned instead of the
    /// experiment's base scenario when this configuration runs. Per spec,
    /// `@` is ranked length −2 and is never applied as a property.
    pub fn set_template(&mut self, template: Scenario) -> &mut Self {
        self.entries.push(("@".to_owned(), Entry::Template(template)));
        self
    }

    /// Registers a validation predicate (spec §4.7(a)): run against the
    /// fully-configured scenario after every setter has applied. If it
    /// returns `false`, this configuration is silently skipped — it produces
    /// no [`ConfigurationResult`] at all, success or failure, in
    /// [`MultiConfExperiment::run_all`]'s output.
    pub fn with_validation(&mut self, predicate: impl Fn(&Scenario) -> bool + 'static) -> &mut Self {
        self.validate = Some(Rc::new(predicate));
        self
    }

    fn is_valid(&self, scenario: &Scenario) -> bool {
        self.validate.as_ref().map(|p| p(scenario)).unwrap_or(true)
    }

    /// `null` (an empty path, meaning "the clone itself") ranks −1; `@` ranks
    /// −2; everything else ranks by path length, ascending.
    fn rank(path: &str) -> i64 {
        if path == "@" {
            -2
        } else if path.is_empty() {
            -1
        } else {
            path.len() as i64
        }
    }

    fn template(&self) -> Option<&Scenario> {
        self.entries.iter().find_map(|(_, e)| match e {
            Entry::Template(s) => Some(s),
            _ => None,
        })
    }

    /// Entries in ascending key-length order (`@` excluded — it is consumed
    /// by [`Configuration::template`], not applied as a setter), ties broken
    /// lexicographically by path.
    fn ordered_setters(&self) -> Vec<(&str, &Rc<dyn ComplexFactorSetter>)> {
        let mut setters: Vec<(&str, &Rc<dyn ComplexFactorSetter>)> = self
            .entries
            .iter()
            .filter_map(|(path, e)| match e {
                Entry::Setter(s) => Some((path.as_str(), s)),
                Entry::Template(_) => None,
            })
            .collect();
        setters.sort_by(|(a, _), (b, _)| Self::rank(a).cmp(&Self::rank(b)).then_with(|| a.cmp(b)));
        setters
    }
}

/// The outcome of running one configuration: either a result map, or a
/// recorded failure (spec §4.7(d)'s `EXCEPTION`/`EXCEPTION_MESSAGE` contract).
pub struct ConfigurationResult {
    pub signature: String,
    pub result: Option<ResultMap>,
    pub exception: Option<String>,
}

impl ConfigurationResult {
    fn failed(signature: String, message: String) -> Self {
        ConfigurationResult { signature, result: None, exception: Some(message) }
    }
}

/// Drives many [`Configuration`]s against one base [`Scenario`] template,
/// running each as an independent replication and aggregating their numeric
/// result-map columns.
pub struct MultiConfExperiment {
    base: Scenario,
    configurations: Vec<(String, Configuration)>,
}

impl MultiConfExperiment {
    pub fn new(base: Scenario) -> Self {
        MultiConfExperiment { base, configurations: Vec::new() }
    }

    pub fn add_configuration(&mut self, signature: impl Into<String>, configuration: Configuration) -> &mut Self {
        self.configurations.push((signature.into(), configuration));
        self
    }

    /// Runs every configuration sequentially: each owns a disjoint clone of
    /// its scenario, so this gives the same result regardless of order.
    /// Kept single-threaded because scenario state is `Rc`-owned (mirroring
    /// the kernel's single-threaded, `Rc<RefCell<..>>`-based ownership style)
    /// and so not `Send` — see `DESIGN.md` for why replication parallelism
    /// stayed off the table rather than forcing `Arc`/`Mutex` throughout the
    /// domain model.
    ///
    /// A configuration rejected by its own [`Configuration::with_validation`]
    /// predicate contributes nothing to the returned `Vec` at all (spec
    /// §4.7(a): "rejected configurations are silently skipped") — it is
    /// neither a success nor an abort.
    pub fn run_all(&self) -> Vec<ConfigurationResult> {
        self.configurations
            .iter()
            .filter_map(|(signature, config)| self.run_one(signature, config))
            .collect()
    }

    fn run_one(&self, signature: &str, config: &Configuration) -> Option<ConfigurationResult> {
        let mut scenario = config.template().cloned().unwrap_or_else(|| self.base.clone());

        for (_, setter) in config.ordered_setters() {
            if let Err(e) = setter.configure(&mut scenario) {
                return Some(ConfigurationResult::failed(signature.to_owned(), e.to_string()));
            }
        }

        if !config.is_valid(&scenario) {
            return None;
        }

        Some(match scenario.run() {
            Ok(result) => ConfigurationResult { signature: signature.to_owned(), result: Some(result), exception: None },
            Err(e) => ConfigurationResult::failed(signature.to_owned(), e.to_string()),
        })
    }
}

/// Per-key running statistics, merged associatively and commutatively (spec
/// §4.7(3)/§5: count, sum, mean, min, max, stddev across replications), so
/// merge order never affects the result.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn one(value: f64) -> Self {
        Accumulator { count: 1, sum: value, sum_sq: value * value, min: value, max: value }
    }

    fn merge(self, other: Self) -> Self {
        Accumulator {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let variance = (self.sum_sq - self.sum * self.sum / self.count as f64) / (self.count - 1) as f64;
        variance.max(0.0).sqrt()
    }

    fn into_result(self) -> ResultMap {
        let mut m = ResultMap::new();
        m.insert("count".to_owned(), ResultValue::Num(self.count as f64));
        m.insert("sum".to_owned(), ResultValue::Num(self.sum));
        m.insert("mean".to_owned(), ResultValue::Num(self.mean()));
        m.insert("min".to_owned(), ResultValue::Num(self.min));
        m.insert("max".to_owned(), ResultValue::Num(self.max));
        m.insert("stddev".to_owned(), ResultValue::Num(self.stddev()));
        m
    }
}

/// Aggregates a batch of [`ConfigurationResult`]s, grouped by signature: for
/// each numeric key present in any successful result, a nested sub-map of
/// count/sum/mean/min/max/stddev; plus `abortCount`, the number of
/// configurations (across all signatures) that raised.
pub fn aggregate(results: &[ConfigurationResult]) -> ResultMap {
    use std::collections::BTreeMap;

    let mut by_signature: BTreeMap<&str, Vec<&ResultMap>> = BTreeMap::new();
    let mut abort_count: u64 = 0;

    for r in results {
        match (&r.result, &r.exception) {
            (Some(map), _) => by_signature.entry(r.signature.as_str()).or_default().push(map),
            (None, Some(_)) => abort_count += 1,
            (None, None) => {}
        }
    }

    let mut out = ResultMap::new();
    for (signature, maps) in by_signature {
        let mut accumulators: BTreeMap<&str, Accumulator> = BTreeMap::new();
        for map in maps {
            for (key, value) in map {
                if let ResultValue::Num(v) = value {
                    accumulators
                        .entry(key.as_str())
                        .and_modify(|acc| *acc = acc.merge(Accumulator::one(*v)))
                        .or_insert_with(|| Accumulator::one(*v));
                }
            }
        }
        let mut nested = ResultMap::new();
        for (key, acc) in accumulators {
            nested.insert(key.to_owned(), ResultValue::Nested(acc.into_result()));
        }
        out.insert(signature.to_owned(), ResultValue::Nested(nested));
    }
    out.insert("abortCount".to_owned(), ResultValue::Num(abort_count as f64));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobSource, Operation, ReleasePlan, WorkStation};
    use crate::priority::Fifo;
    use crate::time::{Duration, Time};
    use std::rc::Rc as StdRc;

    fn base_scenario(release_times: Vec<Time>) -> Scenario {
        let route = StdRc::new(vec![Operation::new(0, Duration(2.0), "only")]);
        let ws = WorkStation::new(0, "W1", 1, Box::new(Fifo));
        let source = JobSource::new(0, "src", "t", route, ReleasePlan::Explicit(release_times));
        Scenario::new(Shop::new(vec![ws], vec![source]), StopCondition::default())
    }

    /// S4: a base scenario's configuration sweep where the second
    /// configuration supplies its own clone-source template (`@`), which
    /// must be used instead of the base.
    #[test]
    fn template_key_overrides_base_clone_source() {
        let base = base_scenario(vec![Time(0.0)]);
        let alt_template = base_scenario(vec![Time(0.0), Time(1.0)]);

        let mut experiment = MultiConfExperiment::new(base);

        let mut cfg_a = Configuration::new();
        cfg_a.set("dueDateFactor", |_: &mut Scenario| Ok(()));
        experiment.add_configuration("a", cfg_a);

        let mut cfg_b = Configuration::new();
        cfg_b.set_template(alt_template);
        cfg_b.set("dueDateFactor", |_: &mut Scenario| Ok(()));
        experiment.add_configuration("b", cfg_b);

        let results = experiment.run_all();

        let jobs_finished = |r: &ConfigurationResult| match r.result.as_ref().unwrap().get("jobsFinished") {
            Some(ResultValue::Num(n)) => *n,
            _ => panic!("missing jobsFinished"),
        };
        assert_eq!(jobs_finished(&results[0]), 1.0);
        assert_eq!(jobs_finished(&results[1]), 2.0, "configuration b must clone altTemplate, not the base");
    }

    /// Property-path apply order: shorter keys (and `null`/`@`) are applied
    /// before longer ones, so a containing object is configured before its
    /// sub-properties.
    #[test]
    fn setters_apply_in_ascending_key_length_order() {
        let base = base_scenario(vec![Time(0.0)]);
        let order = Rc::new(std::cell::RefCell::new(Vec::<&'static str>::new()));

        let mut config = Configuration::new();
        let o1 = order.clone();
        config.set("shop.workstations[0].priorityRule", move |_: &mut Scenario| {
            o1.borrow_mut().push("long");
            Ok(())
        });
        let o2 = order.clone();
        config.set("x", move |_: &mut Scenario| {
            o2.borrow_mut().push("short");
            Ok(())
        });

        let mut experiment = MultiConfExperiment::new(base);
        experiment.add_configuration("only", config);
        experiment.run_all();

        assert_eq!(*order.borrow(), vec!["short", "long"]);
    }

    /// S6: a 4-configuration sweep where configuration #2 raises during
    /// setup; aggregation sees three successes and one abort.
    #[test]
    fn fault_in_one_configuration_is_isolated() {
        let base = base_scenario(vec![Time(0.0)]);
        let mut experiment = MultiConfExperiment::new(base);

        for i in 0..4 {
            let mut config = Configuration::new();
            if i == 1 {
                config.set("boom", |_: &mut Scenario| Err(Error::invalid_config("simulated setup failure")));
            }
            experiment.add_configuration(format!("cfg{i}"), config);
        }

        let results = experiment.run_all();
        let successes = results.iter().filter(|r| r.result.is_some()).count();
        let failures = results.iter().filter(|r| r.exception.is_some()).count();
        assert_eq!(successes, 3);
        assert_eq!(failures, 1);

        let summary = aggregate(&results);
        assert_eq!(summary.get("abortCount"), Some(&ResultValue::Num(1.0)));
    }

    /// Spec §4.7(a): a configuration whose predicate rejects it is silently
    /// skipped — absent from `run_all`'s output entirely, not recorded as a
    /// failure.
    #[test]
    fn rejected_configuration_is_silently_skipped() {
        let base = base_scenario(vec![Time(0.0)]);
        let mut experiment = MultiConfExperiment::new(base);

        let mut accepted = Configuration::new();
        accepted.with_validation(|_: &Scenario| true);
        experiment.add_configuration("accepted", accepted);

        let mut rejected = Configuration::new();
        rejected.with_validation(|_: &Scenario| false);
        experiment.add_configuration("rejected", rejected);

        let results = experiment.run_all();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].signature, "accepted");
        assert!(results[0].result.is_some());
        assert!(results[0].exception.is_none());

        let summary = aggregate(&results);
        assert_eq!(summary.get("abortCount"), Some(&ResultValue::Num(0.0)));
    }

    /// Aggregation's mean/stddev are plain floating-point arithmetic over
    /// replication outcomes, so they're checked with a tolerance rather than
    /// exact equality.
    #[test]
    fn accumulator_mean_and_stddev_match_known_sample() {
        let acc = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .into_iter()
            .map(Accumulator::one)
            .reduce(Accumulator::merge)
            .unwrap();

        approx::assert_relative_eq!(acc.mean(), 5.0, epsilon = 1e-9);
        approx::assert_relative_eq!(acc.stddev(), 2.138089935, epsilon = 1e-6);
    }
}
