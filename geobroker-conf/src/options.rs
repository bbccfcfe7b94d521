use structopt::StructOpt;

use crate::Strategy;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "geobroker", about = "Geo-aware publish/subscribe broker")]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// Broker id, must match one of the configured broker areas in geo-distributed mode
    #[structopt(name = "id", long)]
    pub broker_id: Option<String>,

    /// Raster granularity, cells per degree
    #[structopt(name = "granularity", long)]
    pub granularity: Option<u32>,

    /// Matching strategy, standalone | geo_distributed
    #[structopt(name = "strategy", long)]
    pub strategy: Option<Strategy>,
}
