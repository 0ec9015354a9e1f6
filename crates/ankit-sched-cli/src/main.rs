//! Command-line front end for the ankit-sched scheduling engine.
//!
//! Opens a collection file, runs one scheduler operation, and prints the
//! result as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;

use ankit_sched::{
    CancelToken, CardId, Collection, DeckId, Error, SchedulerConfig, UnburyKind,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

// ============================================================================
// CLI Arguments
// ============================================================================

/// Inspect and drive the spaced-repetition scheduler of a collection.
#[derive(Parser, Debug)]
#[command(name = "ankit-sched")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the collection database (created if missing)
    #[arg(short, long, default_value = "collection.anki2")]
    collection: PathBuf,

    /// Scheduler settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deck to select before running the command
    #[arg(short, long)]
    deck: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Due counts for the selected deck and its subdecks
    Counts,
    /// Due counts for every deck, nested by name
    Tree,
    /// Estimated seconds to clear what is due now
    Eta,
    /// The next card to study, with its answer buttons and intervals
    Next,
    /// Answer a card
    Answer {
        /// Card ID
        card: CardId,
        /// Button pressed (1 = again ... 4 = easy)
        ease: u8,
    },
    /// Suspend cards
    Suspend {
        /// Card IDs
        #[arg(required = true)]
        cards: Vec<CardId>,
    },
    /// Unsuspend cards
    Unsuspend {
        #[arg(required = true)]
        cards: Vec<CardId>,
    },
    /// Bury cards until tomorrow
    Bury {
        #[arg(required = true)]
        cards: Vec<CardId>,
        /// Bury as siblings, lifted automatically at rollover
        #[arg(long, default_value_t = false)]
        sibling: bool,
    },
    /// Unbury cards in the selected deck
    Unbury {
        /// Which buried cards to restore: all, manual or siblings
        #[arg(long, default_value = "all")]
        kind: String,
    },
    /// Return cards to the new queue
    Forget {
        #[arg(required = true)]
        cards: Vec<CardId>,
    },
    /// Rebuild a filtered deck
    Rebuild {
        /// Filtered deck name
        name: String,
    },
    /// Empty a filtered deck, returning cards home
    Empty {
        /// Filtered deck name
        name: String,
    },
}

fn parse_unbury_kind(kind: &str) -> Result<UnburyKind, Error> {
    match kind.to_lowercase().as_str() {
        "all" => Ok(UnburyKind::All),
        "manual" => Ok(UnburyKind::Manual),
        "siblings" | "sibling" => Ok(UnburyKind::Siblings),
        other => Err(Error::Config(format!(
            "unknown unbury kind '{other}' (expected all, manual or siblings)"
        ))),
    }
}

fn deck_id(col: &Collection, name: &str) -> Result<DeckId, Error> {
    col.decks()
        .by_name(name)
        .map(|deck| deck.id)
        .ok_or_else(|| Error::Config(format!("no deck named '{name}'")))
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NextCard {
    card: ankit_sched::Card,
    buttons: u8,
    intervals: Vec<i64>,
}

fn run(col: &mut Collection, command: Command) -> Result<serde_json::Value, Error> {
    let current = col.conf().cur_deck;
    let mut sched = col.sched();

    let value = match command {
        Command::Counts => serde_json::to_value(sched.counts()?)?,
        Command::Tree => match sched.deck_due_tree(&CancelToken::new())? {
            Some(tree) => serde_json::to_value(tree)?,
            None => serde_json::Value::Null,
        },
        Command::Eta => {
            let counts = sched.counts()?;
            json!({ "counts": counts, "seconds": sched.eta(counts)? })
        }
        Command::Next => match sched.get_next_card()? {
            Some(card) => {
                let buttons = sched.answer_buttons(&card)?;
                let intervals = (1..=buttons)
                    .map(|ease| sched.next_interval(&card, ease))
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_value(NextCard {
                    card,
                    buttons,
                    intervals,
                })?
            }
            None => serde_json::Value::Null,
        },
        Command::Answer { card, ease } => {
            let card = sched.collection().get_card(card)?;
            serde_json::to_value(sched.answer(&card, ease)?)?
        }
        Command::Suspend { cards } => json!({ "changed": sched.suspend_cards(&cards)? }),
        Command::Unsuspend { cards } => json!({ "changed": sched.unsuspend_cards(&cards)? }),
        Command::Bury { cards, sibling } => {
            json!({ "changed": sched.bury_cards(&cards, !sibling)? })
        }
        Command::Unbury { kind } => {
            let kind = parse_unbury_kind(&kind)?;
            json!({ "changed": sched.unbury_deck_kind(current, kind)? })
        }
        Command::Forget { cards } => json!({ "changed": sched.forget_cards(&cards)? }),
        Command::Rebuild { name } => {
            let did = deck_id(sched.collection(), &name)?;
            json!({ "deck": did, "moved": sched.rebuild_filtered(did)? })
        }
        Command::Empty { name } => {
            let did = deck_id(sched.collection(), &name)?;
            json!({ "deck": did, "returned": sched.empty_filtered(did)? })
        }
    };
    Ok(value)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };
    info!(
        collection = %args.collection.display(),
        version = ?config.version,
        "Opening collection"
    );

    let mut col = Collection::builder()
        .path(&args.collection)
        .config(config)
        .open()?;

    if let Some(name) = &args.deck {
        let did = deck_id(&col, name)?;
        col.select_deck(did)?;
        debug!(deck = did, name = %name, "selected deck");
    }

    let value = run(&mut col, args.command)?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unbury_kind() {
        assert_eq!(parse_unbury_kind("all").unwrap(), UnburyKind::All);
        assert_eq!(parse_unbury_kind("Manual").unwrap(), UnburyKind::Manual);
        assert_eq!(parse_unbury_kind("siblings").unwrap(), UnburyKind::Siblings);
        assert!(parse_unbury_kind("everything").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "ankit-sched",
            "--collection",
            "my.anki2",
            "-vv",
            "answer",
            "42",
            "3",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Answer { card: 42, ease: 3 }));
    }

    #[test]
    fn test_counts_on_fresh_collection() {
        let mut col = Collection::open_in_memory().unwrap();
        let value = run(&mut col, Command::Counts).unwrap();
        assert_eq!(value, json!({ "new": 0, "learn": 0, "review": 0 }));
    }

    #[test]
    fn test_next_reports_buttons_and_intervals() {
        let mut col = Collection::open_in_memory().unwrap();
        let note = col.add_note(&["front", "back"], &[]).unwrap();
        col.add_card(note, 1).unwrap();

        let value = run(&mut col, Command::Next).unwrap();
        assert_eq!(value["buttons"], 4);
        assert_eq!(value["intervals"].as_array().unwrap().len(), 4);
        assert_eq!(value["intervals"][0], 60);
    }

    #[test]
    fn test_unknown_filtered_deck() {
        let mut col = Collection::open_in_memory().unwrap();
        let result = run(
            &mut col,
            Command::Rebuild {
                name: "Missing".into(),
            },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
