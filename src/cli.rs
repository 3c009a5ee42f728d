use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use selection_report::Method;

#[derive(Parser, Debug)]
#[command(
    name = "selection-report",
    version,
    about = "Summaries, tiles and tables for codon selection-analysis results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Summary(QueryArgs),
    Tiles(QueryArgs),
    Table(TableArgs),
    Report(ReportArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MethodArg {
    Auto,
    Fel,
    Meme,
    Absrel,
    Fubar,
    MultiHit,
}

impl MethodArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Fel => "fel",
            Self::Meme => "meme",
            Self::Absrel => "absrel",
            Self::Fubar => "fubar",
            Self::MultiHit => "multi-hit",
        }
    }

    /// `None` asks for detection from the document.
    pub fn method(self) -> Option<Method> {
        match self {
            Self::Auto => None,
            Self::Fel => Some(Method::Fel),
            Self::Meme => Some(Method::Meme),
            Self::Absrel => Some(Method::Absrel),
            Self::Fubar => Some(Method::Fubar),
            Self::MultiHit => Some(Method::MultiHit),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Result document; `-` reads stdin.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, value_enum, default_value_t = MethodArg::Auto)]
    pub method: MethodArg,

    /// p-value cutoff, or minimum posterior probability for FUBAR.
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub er_threshold: Option<f64>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TableView {
    Primary,
    /// aBSREL only.
    OmegaDistribution,
    /// aBSREL only.
    SiteProfile,
    /// Multi-hit only.
    SiteLogLikelihood,
}

impl TableView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::OmegaDistribution => "omega-distribution",
            Self::SiteProfile => "site-profile",
            Self::SiteLogLikelihood => "site-log-likelihood",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[arg(long, value_enum, default_value_t = TableView::Primary)]
    pub view: TableView,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[arg(long)]
    pub output: PathBuf,
}
