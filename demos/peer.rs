//! Interactive peer: greets its neighbors, loads its keys, then reads
//! commands from stdin until `9` or end of input.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use peersearch::{Node, SearchMode, SearchOutcome};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// host:port to listen on
    address: String,
    /// File with one neighbor `host:port` per line
    #[arg(long)]
    neighbors: Option<PathBuf>,
    /// File with one `key value` pair per line
    #[arg(long)]
    keys: Option<PathBuf>,
    /// How long to wait for search results, in seconds
    #[arg(long, default_value_t = 3)]
    wait: u64,
}

const MENU: &str = "
Choose a command
 [0] List neighbors
 [1] HELLO
 [2] SEARCH (flooding)
 [3] SEARCH (random walk)
 [4] SEARCH (depth-first)
 [5] Statistics
 [6] Change default TTL
 [9] Exit";

fn main() {
    tracing_subscriber::fmt()
        // Switch to DEBUG to follow every forwarding decision
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let node = Node::builder()
        .address(&cli.address)
        .build()
        .expect("Failed to start node");

    if let Some(path) = &cli.neighbors {
        for (address, acknowledged) in node
            .bootstrap_neighbors(path)
            .expect("Failed to load neighbors")
        {
            println!("Trying to add neighbor {address}: acknowledged={acknowledged}");
        }
    }
    if let Some(path) = &cli.keys {
        node.bootstrap_keys(path).expect("Failed to load keys");
    }

    let wait = Duration::from_secs(cli.wait);
    let mut lines = io::stdin().lock().lines();

    loop {
        println!("{MENU}");
        let Some(Ok(command)) = lines.next() else {
            break;
        };

        match command.trim() {
            "0" => {
                let neighbors = node.neighbors().unwrap();
                println!("There are {} neighbors in the table:", neighbors.len());
                for (index, neighbor) in neighbors.iter().enumerate() {
                    println!("  [{index}] {neighbor}");
                }
            }
            "1" => {
                let Some(index) = prompt(&mut lines, "Neighbor index")
                    .and_then(|line| line.parse::<usize>().ok())
                else {
                    continue;
                };
                match node.send_hello(index) {
                    Ok(acknowledged) => println!("HELLO acknowledged: {acknowledged}"),
                    Err(error) => println!("{error}"),
                }
            }
            "2" => search(&node, &mut lines, SearchMode::Flood, wait),
            "3" => search(&node, &mut lines, SearchMode::RandomWalk, wait),
            "4" => search(&node, &mut lines, SearchMode::DepthFirst, wait),
            "5" => println!("{}", node.statistics().unwrap()),
            "6" => {
                let Some(ttl) = prompt(&mut lines, "New default TTL")
                    .and_then(|line| line.parse::<i64>().ok())
                else {
                    continue;
                };
                if let Err(error) = node.set_default_ttl(ttl) {
                    println!("{error}");
                }
            }
            "9" => break,
            other => println!("Unknown command {other:?}"),
        }
    }

    println!("Exiting...");
    node.shutdown();
}

fn prompt(lines: &mut impl Iterator<Item = io::Result<String>>, label: &str) -> Option<String> {
    print!("{label}: ");
    let _ = io::stdout().flush();

    lines.next()?.ok().map(|line| line.trim().to_string())
}

fn search(
    node: &Node,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    mode: SearchMode,
    wait: Duration,
) {
    let Some(key) = prompt(lines, "Key") else {
        return;
    };

    let response = match node.search(mode, &key) {
        Ok(response) => response,
        Err(error) => {
            println!("{error}");
            return;
        }
    };

    while let Some(outcome) = response.recv_timeout(wait) {
        match outcome {
            SearchOutcome::Local { key, value, .. } => {
                println!("Key {key} is local, value: {value}");
                return;
            }
            SearchOutcome::Found {
                key,
                value,
                hop_count,
                holder,
                ..
            } => println!("Key {key} found at {holder} after {hop_count} hops, value: {value}"),
            SearchOutcome::Exhausted { key } => {
                println!("Key {key} could not be located");
                return;
            }
        }
    }
}
