use anyhow::Context;
use clap::Parser;
use racesim::core::handle_race::{handle_race, RaceOutcome, StopHandle};
use racesim::core::race::{RacePars, SimConstants};
use racesim::interfaces::messages::RaceMessage;
use racesim::pre::read_sim_pars::{read_race_pars, read_sim_constants};
use racesim::pre::roster::JsonFileRoster;
use racesim::pre::sim_opts::{OutputFormat, SimOpts};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::thread;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();

    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if sim_opts.debug {
        log_builder.filter_level(log::LevelFilter::Debug);
    }
    log_builder.init();

    // get simulation constants
    let sim_consts = if let Some(config_path) = &sim_opts.config_path {
        log::info!("Reading simulation constants from {:?}", config_path);
        read_sim_constants(config_path)?
    } else {
        SimConstants::default()
    };

    // get race parameters, command line options override the file
    let mut race_pars = if let Some(race_pars_path) = &sim_opts.race_pars_path {
        log::info!("Reading race parameters from {:?}", race_pars_path);
        read_race_pars(race_pars_path)?
    } else {
        RacePars::default()
    };
    if let Some(course) = &sim_opts.course {
        race_pars.course = Some(course.to_owned());
    }
    if let Some(condition) = sim_opts.condition {
        race_pars.condition = condition;
    }
    if let Some(laps) = sim_opts.laps {
        race_pars.tot_no_laps = laps;
    }

    let rng = match sim_opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let realtime_factor = if sim_opts.realtime_factor > 0.0 {
        Some(sim_opts.realtime_factor)
    } else {
        None
    };

    log::info!(
        "Simulating {} laps at {} ({}), roster {:?}",
        race_pars.tot_no_laps,
        race_pars.course.as_deref().unwrap_or(&sim_consts.fallback_course),
        race_pars.condition,
        sim_opts.roster_path
    );

    // EXECUTION -----------------------------------------------------------------------------------
    // the race runs in its own thread and publishes its messages over the channel
    let (tx, rx) = flume::unbounded::<RaceMessage>();
    let stop = StopHandle::new();
    let max_ticks = sim_opts.max_ticks;
    let roster = JsonFileRoster::new(&sim_opts.roster_path);
    let t_start = Instant::now();

    let race_thread = thread::spawn(move || {
        let mut tx = tx;
        handle_race(
            &roster,
            &race_pars,
            &sim_consts,
            rng,
            &mut tx,
            &stop,
            realtime_factor,
            max_ticks,
        )
    });

    for msg in rx.iter() {
        match sim_opts.format {
            OutputFormat::Text => {
                if let RaceMessage::Event(event) = &msg {
                    println!("{}", event);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(&msg).context("Failed to serialize race message!")?
                );
            }
            OutputFormat::Csv => {}
        }
    }

    let outcome = race_thread
        .join()
        .map_err(|_| anyhow::anyhow!("Race thread panicked!"))??;

    log::info!("Execution time: {}ms", t_start.elapsed().as_millis());

    // POST-PROCESSING -----------------------------------------------------------------------------
    match outcome {
        RaceOutcome::Finished(result) | RaceOutcome::Abandoned(result) => match sim_opts.format {
            OutputFormat::Text => result.print_standings(),
            OutputFormat::Csv => result.write_standings_csv(io::stdout())?,
            OutputFormat::Json => {}
        },
        RaceOutcome::Stopped { tick } => {
            log::info!("Race stopped after tick {}, no final standings", tick)
        }
    }

    Ok(())
}
