#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use self::logging::Log;

pub use self::options::Options;

pub mod logging;
pub mod options;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub areas: Vec<AreaConf>,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/geobroker/geobroker").required(false))
            .add_source(File::with_name("geobroker").required(false))
            .add_source(
                //e.g. GEOBROKER_BROKER__GRANULARITY=10
                config::Environment::with_prefix("geobroker").prefix_separator("_").separator("__").try_parsing(true),
            );

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        Self::build(builder, opts)
    }

    fn build(builder: ConfigBuilder<DefaultState>, opts: Options) -> Result<Self> {
        let mut inner: Inner = builder.build()?.try_deserialize()?;

        //Command line configuration overriding file configuration
        if let Some(id) = opts.broker_id.as_ref() {
            inner.broker.id.clone_from(id);
        }
        if let Some(granularity) = opts.granularity {
            inner.broker.granularity = granularity;
        }
        if let Some(strategy) = opts.strategy {
            inner.broker.strategy = strategy;
        }

        if inner.broker.granularity == 0 {
            return Err(anyhow!("broker.granularity must be at least 1"));
        }
        if inner.broker.workers == 0 {
            return Err(anyhow!("broker.workers must be at least 1"));
        }

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    #[inline]
    pub fn instance() -> &'static Self {
        match SETTINGS.get() {
            Some(c) => c,
            None => {
                unreachable!("Settings not initialized");
            }
        }
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance();
        log::debug!("Config info is {:?}", cfg.0);
        log::info!("broker id is {}", cfg.broker.id);
        log::info!("strategy is {:?}", cfg.broker.strategy);
        log::info!("raster granularity is {}", cfg.broker.granularity);
        log::info!("workers is {}, queue_max is {}", cfg.broker.workers, cfg.broker.queue_max);
        for area in cfg.areas.iter() {
            log::info!("broker area {}@{}:{} => {}", area.id, area.address, area.port, area.boundary);
        }
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Broker {
    #[serde(default = "Broker::id_default")]
    pub id: String,
    //Raster cells per degree, at least 1.
    #[serde(default = "Broker::granularity_default")]
    pub granularity: u32,
    #[serde(default)]
    pub strategy: Strategy,
    //Number of message processing workers.
    #[serde(default = "Broker::workers_default")]
    pub workers: usize,
    //Queue capacity of each worker.
    #[serde(default = "Broker::queue_max_default")]
    pub queue_max: usize,
}

impl Default for Broker {
    #[inline]
    fn default() -> Self {
        Self {
            id: Self::id_default(),
            granularity: Self::granularity_default(),
            strategy: Strategy::default(),
            workers: Self::workers_default(),
            queue_max: Self::queue_max_default(),
        }
    }
}

impl Broker {
    fn id_default() -> String {
        "broker".into()
    }
    fn granularity_default() -> u32 {
        1
    }
    fn workers_default() -> usize {
        4
    }
    fn queue_max_default() -> usize {
        100_000
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Standalone,
    GeoDistributed,
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "standalone" => Ok(Strategy::Standalone),
            "geo_distributed" | "distributed" => Ok(Strategy::GeoDistributed),
            _ => Err(anyhow!("unknown strategy `{}`, expected standalone or geo_distributed", s)),
        }
    }
}

/// One entry of the broker-area description.
///
/// `boundary` is a WKT polygon whose coordinates are `lon lat` pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaConf {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub boundary: String,
}
