//! Command-line argument handling.

use anyhow::{anyhow, bail, Result};
use feedcache_core::FeedCacheKey;

pub const USAGE: &str = "\
Usage: feedcache <command> [filters]

Commands:
  stats                 Show number, size and age of cached feeds
  key [filters]         Print the cache key for a filter set
  show [filters] [--json]
                        Print the cached feed for a filter set
  clear [filters]       Remove the cached feed for a filter set
  clear --all           Remove every cached feed

Filters:
  --country <c>  --city <c>  --category <c>  --subcategory <s>
  --sort <s>  --seller <id>  --search <term>";

#[derive(Debug, PartialEq)]
pub enum Command {
    Stats,
    Key(FeedCacheKey),
    Show { key: FeedCacheKey, json: bool },
    Clear(FeedCacheKey),
    ClearAll,
    Help,
}

pub fn parse(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "stats" => {
            if let Some(extra) = rest.first() {
                bail!("Unexpected argument: {}", extra);
            }
            Ok(Command::Stats)
        }
        "key" => Ok(Command::Key(parse_filters(rest, &[])?.0)),
        "show" => {
            let (key, flags) = parse_filters(rest, &["--json"])?;
            Ok(Command::Show {
                key,
                json: flags.contains(&"--json"),
            })
        }
        "clear" => {
            let (key, flags) = parse_filters(rest, &["--all"])?;
            if flags.contains(&"--all") {
                if key != FeedCacheKey::default() {
                    bail!("--all cannot be combined with filters");
                }
                return Ok(Command::ClearAll);
            }
            Ok(Command::Clear(key))
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}

/// Parse `--name value` filters, collecting any of `allowed_flags` seen
fn parse_filters<'a>(
    args: &[String],
    allowed_flags: &[&'a str],
) -> Result<(FeedCacheKey, Vec<&'a str>)> {
    let mut key = FeedCacheKey::default();
    let mut flags = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if let Some(flag) = allowed_flags.iter().find(|f| **f == arg.as_str()) {
            flags.push(*flag);
            continue;
        }

        let slot = match arg.as_str() {
            "--country" => &mut key.country,
            "--city" => &mut key.city,
            "--category" => &mut key.category,
            "--subcategory" => &mut key.subcategory,
            "--sort" => &mut key.sort,
            "--seller" => &mut key.seller_id,
            "--search" => &mut key.search,
            other => bail!("Unknown option: {}", other),
        };
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("Missing value for {}", arg))?;
        *slot = Some(value.clone());
    }

    Ok((key, flags))
}
