//! Command handlers
//!
//! Thin dispatch from parsed CLI arguments to the library. All output
//! goes through the formatters; `--json` swaps in serde_json.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::{formatters, CacheCommands, Cli, Commands, FlowCommands, ReturnCommands};
use crate::config::{load_config, Config};
use crate::db::{self, FlowType};
use crate::engine::ReturnEngine;

pub fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let db_path = cli.db.as_ref().map(PathBuf::from);

    match &cli.command {
        Commands::Init => {
            db::init_database(db_path)?;
            println!("Database initialized.");
            Ok(())
        }

        Commands::Flows { action } => handle_flows(action, db_path, cli.json),

        Commands::Returns { action } => {
            let config = load_cli_config(&cli)?;
            let engine = ReturnEngine::open(config, db_path)?;
            match action {
                ReturnCommands::Unit { unit, source } => {
                    let result = engine.unit_return(unit, source)?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        print!("{}", formatters::format_unit_return(&result));
                    }
                    Ok(())
                }
                ReturnCommands::All { source } => {
                    let report = engine.source_returns(source)?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print!("{}", formatters::format_batch_report(&report));
                    }
                    Ok(())
                }
            }
        }

        Commands::Scan { source } => {
            let config = load_cli_config(&cli)?;
            let engine = ReturnEngine::open(config, db_path)?;
            let report = engine.scan_source(source)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", formatters::format_scan_report(&report));
            }
            Ok(())
        }

        Commands::Cache { action } => match action {
            CacheCommands::Purge => {
                let config = load_cli_config(&cli)?;
                // Opening the engine runs the purge sweep
                ReturnEngine::open(config, db_path)?;
                println!("Cache purge complete.");
                Ok(())
            }
        },
    }
}

fn load_cli_config(cli: &Cli) -> Result<Config> {
    load_config(cli.config.as_ref().map(std::path::Path::new))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::from_str(raw).with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(&raw.replace(',', ""))
        .with_context(|| format!("invalid amount '{}'", raw))
}

fn parse_flow_type(raw: &str) -> Result<FlowType> {
    raw.parse::<FlowType>()
        .map_err(|_| anyhow!("invalid flow type '{}', expected inflow or outflow", raw))
}

fn handle_flows(action: &FlowCommands, db_path: Option<PathBuf>, json: bool) -> Result<()> {
    let conn = db::open_db(db_path)?;
    conn.execute_batch(include_str!("../db/schema.sql"))?;

    match action {
        FlowCommands::Add {
            unit,
            date,
            flow_type,
            amount,
            note,
        } => {
            let date = parse_date(date)?;
            let flow_type = parse_flow_type(flow_type)?;
            let amount = parse_amount(amount)?;
            db::add_cash_flow(&conn, unit, date, flow_type, amount, note.as_deref())?;
            println!(
                "Recorded {} {} for {} on {}.",
                flow_type.as_str(),
                amount,
                unit,
                date
            );
            Ok(())
        }

        FlowCommands::Remove {
            unit,
            date,
            flow_type,
            amount,
        } => {
            let date = parse_date(date)?;
            let flow_type = parse_flow_type(flow_type)?;
            let amount = parse_amount(amount)?;
            if db::remove_cash_flow(&conn, unit, date, flow_type, amount)? {
                println!("Removed.");
                Ok(())
            } else {
                Err(anyhow!(
                    "no {} of {} for {} on {}",
                    flow_type.as_str(),
                    amount,
                    unit,
                    date
                ))
            }
        }

        FlowCommands::List { unit } => {
            let flows = db::list_cash_flows(&conn, unit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&flows)?);
            } else {
                print!("{}", formatters::format_flows(unit, &flows));
            }
            Ok(())
        }

        FlowCommands::Clear { unit, yes } => {
            if !yes {
                return Err(anyhow!(
                    "refusing to delete all flows for {} without --yes",
                    unit
                ));
            }
            let removed = db::delete_all_cash_flows(&conn, unit)?;
            println!("Removed {} flows for {}.", removed, unit);
            Ok(())
        }

        FlowCommands::Net { unit, date } => {
            let date = parse_date(date)?;
            let net = db::net_cash_flow(&conn, unit, date)?;
            if json {
                println!("{}", serde_json::json!({ "unit": unit, "date": date, "net_flow": net }));
            } else {
                println!("{}", net);
            }
            Ok(())
        }
    }
}
