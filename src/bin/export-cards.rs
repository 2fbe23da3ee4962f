use clap::Parser;
use pokemon_tcg_crawler::pokemon::TcgData;
use std::io::{self, BufWriter, Write};

/// Prints every stored card as one JSON object per line, or as readable text.
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, env = "TCG_DATABASE", default_value = "tcg.db")]
    database: String,

    #[arg(long, default_value = "tcg")]
    table_prefix: String,

    /// Include the card url as a `url` field
    #[arg(long)]
    with_url: bool,

    /// Print a readable summary instead of JSON
    #[arg(long)]
    text: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let data = TcgData::new(&cli.database, &cli.table_prefix).await?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (url, card) in data.cards.get_all().await? {
        if cli.text {
            writeln!(out, "Url             : {}", url)?;
            writeln!(out, "{}", card)?;
            continue;
        }

        let mut value = serde_json::to_value(&card)?;
        if cli.with_url {
            if let Some(object) = value.as_object_mut() {
                object.insert("url".to_string(), serde_json::Value::String(url));
            }
        }
        serde_json::to_writer(&mut out, &value)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
