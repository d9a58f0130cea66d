//! `Version`: broker software version and uptime

use crate::collector::{CollectContext, Collector};
use async_trait::async_trait;
use scrape_broker::{decode_reply, Page, PagedQuery, ShowCommand};
use scrape_core::{
    BrokerRequest, BrokerResponse, DataSource, Measurement, MetricDesc, MetricSink, Result,
};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

pub const FAMILY: &str = "Version";

static VERSION_INFO: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_system_version_info",
        "Broker software version; value is always 1",
        &["version"],
    ))
});

static UPTIME: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_system_uptime_seconds",
        "Broker uptime",
        &[],
    ))
});

#[derive(Debug, Deserialize)]
struct Rpc {
    show: Show,
}

#[derive(Debug, Deserialize)]
struct Show {
    version: VersionInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VersionInfo {
    current_load: String,
    #[serde(default)]
    uptime: Option<Uptime>,
}

#[derive(Debug, Default, Deserialize)]
struct Uptime {
    #[serde(default)]
    days: u64,
    #[serde(default)]
    hours: u64,
    #[serde(default)]
    mins: u64,
    #[serde(default)]
    secs: u64,
}

impl Uptime {
    fn total_seconds(&self) -> u64 {
        ((self.days * 24 + self.hours) * 60 + self.mins) * 60 + self.secs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionRow {
    pub version: String,
    pub uptime_seconds: Option<f64>,
}

/// `show version`; always a single page
pub struct VersionQuery;

impl PagedQuery for VersionQuery {
    type Row = VersionRow;

    fn first_request(&self) -> BrokerRequest {
        BrokerRequest::Command {
            body: ShowCommand::new("version").to_xml(),
        }
    }

    fn next_request(&self, cursor: &str) -> BrokerRequest {
        BrokerRequest::Command {
            body: cursor.to_string(),
        }
    }

    fn decode(&self, response: &BrokerResponse) -> Result<Page<VersionRow>> {
        let version = decode_reply::<Rpc>(&response.body)?.payload.show.version;
        Ok(Page::last(vec![VersionRow {
            version: version.current_load,
            uptime_seconds: version.uptime.map(|u| u.total_seconds() as f64),
        }]))
    }

    fn row_key(&self, row: &VersionRow) -> String {
        row.version.clone()
    }
}

pub struct VersionCollector;

#[async_trait]
impl Collector for VersionCollector {
    fn family(&self) -> &'static str {
        FAMILY
    }

    fn field_names(&self) -> Vec<&'static str> {
        vec!["version", "uptime"]
    }

    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        for row in ctx.query(&VersionQuery).await? {
            if source.selects("version") {
                sink.push(Measurement::new(&VERSION_INFO, 1.0, [row.version.as_str()])?);
            }
            if let (true, Some(uptime)) = (source.selects("uptime"), row.uptime_seconds) {
                sink.push(Measurement::new(&UPTIME, uptime, Vec::<String>::new())?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_dev::fixtures::{version_xml, xml_reply};

    #[test]
    fn test_decode_version() {
        let response = xml_reply(&version_xml("soltr_10.4.1.121", 93_784), None);
        let page = VersionQuery.decode(&response).unwrap();

        assert_eq!(page.next_cursor, None);
        assert_eq!(page.rows[0].version, "soltr_10.4.1.121");
        assert_eq!(page.rows[0].uptime_seconds, Some(93_784.0));
    }
}
