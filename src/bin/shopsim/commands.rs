use shopsim::output::{ChromeTraceListener, JobTraceListener};
use shopsim::utils::logging::prelude::*;
use shopsim::utils::{AppConfig, Result};

use crate::demo;

/// Shows the resolved configuration.
pub fn config() -> Result<()> {
    let config = AppConfig::fetch()?;
    println!("{:#?}", config);
    Ok(())
}

/// Builds the built-in demo scenario, runs it to completion, prints its
/// result map, and writes the Chrome trace + job CSV to the configured
/// output directory.
pub fn run() -> Result<()> {
    let scenario = demo::scenario();
    let mut sim = shopsim::Simulation::new(scenario.shop, scenario.stop);
    sim.init()?;

    let chrome = std::rc::Rc::new(std::cell::RefCell::new(ChromeTraceListener::new()));
    let jobs = std::rc::Rc::new(std::cell::RefCell::new(JobTraceListener::new()));
    sim.subscribe(shopsim::listener::ALL_EVENT_KINDS, chrome.clone())?;
    sim.subscribe(shopsim::listener::ALL_EVENT_KINDS, jobs.clone())?;

    sim.run()?;

    let mut results = shopsim::ResultMap::new();
    sim.contribute_results(&mut results)?;

    let app_config = AppConfig::fetch()?;
    chrome.borrow().write(&app_config)?;
    jobs.borrow().write(&app_config)?;

    info!("scenario finished, writing results to {}", app_config.output_dir.display());
    println!("{:#?}", results);

    Ok(())
}
