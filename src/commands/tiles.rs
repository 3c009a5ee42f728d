use std::io::{self, Write};

use anyhow::{Context, Result};
use selection_report::TileSpec;
use tracing::info;

use crate::cli::QueryArgs;
use crate::commands::load::load;

pub fn run(args: QueryArgs) -> Result<()> {
    let analysis = load(&args)?;
    let tiles = analysis
        .method
        .tiles(analysis.document(), &analysis.thresholds);

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &tiles)
            .context("failed to serialize tiles json output")?;
        writeln!(output)?;
    } else {
        for tile in &tiles {
            writeln!(output, "{}", tile_line(tile))?;
        }
    }
    output.flush()?;

    info!(method = %analysis.method, tiles = tiles.len(), "tiles complete");
    Ok(())
}

fn tile_line(tile: &TileSpec) -> String {
    format!("{}\t{}\t{}", tile.key, tile.number, tile.description)
}

#[cfg(test)]
mod tests {
    use selection_report::model::TileCategory;

    use super::*;

    #[test]
    fn tile_line_is_tab_separated() {
        let tile = TileSpec::new("sites", 12_usize, "codon sites in the alignment", TileCategory::Input, "icon");
        assert_eq!(tile_line(&tile), "sites\t12\tcodon sites in the alignment");
    }
}
