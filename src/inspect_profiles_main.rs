//! Profile database inspection binary

use clap::Parser;
use meowmiles::store::{get_i64, ProfileStore, RocksProfileStore};

#[derive(Parser, Debug)]
#[command(name = "inspect_profiles")]
#[command(about = "Print the profiles stored in a Meow Miles database", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/meowmiles")]
    db_path: String,

    /// Maximum number of profiles to print
    #[arg(long, default_value = "20")]
    limit: usize,

    /// Print each full document as JSON
    #[arg(long)]
    full: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let store = RocksProfileStore::open(&args.db_path, false)?;
    let profiles = store.list(args.limit).await?;

    println!("Database: {}", args.db_path);
    println!("Profiles shown: {}", profiles.len());
    println!();

    for (address, doc) in profiles {
        if args.full {
            println!("{} {}", address, serde_json::to_string_pretty(&doc)?);
            continue;
        }
        let miles = get_i64(&doc, "miles").unwrap_or(0);
        let redeemed = get_i64(&doc, "redeemedMiles").unwrap_or(0);
        let badges = doc
            .get("claimedBadges")
            .and_then(|b| b.as_array())
            .map(|b| b.len())
            .unwrap_or(0);
        println!("{}  miles={:<8} redeemed={:<8} badges={}", address, miles, redeemed, badges);
    }

    Ok(())
}
