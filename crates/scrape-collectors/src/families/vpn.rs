//! `VpnStats`: per message-VPN traffic counters and rates

use crate::collector::{emit_row, field_names, CollectContext, Collector, Field};
use async_trait::async_trait;
use scrape_broker::{decode_reply, Page, PagedQuery, ShowCommand};
use scrape_core::{
    BrokerRequest, BrokerResponse, DataSource, MetricDesc, MetricSink, Result,
};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const FAMILY: &str = "VpnStats";

const LABELS: &[&str] = &["vpn_name"];

pub(crate) static RX_MSG_RATE: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_vpn_rx_msg_rate",
        "Current ingress rate in messages per second",
        LABELS,
    ))
});

pub(crate) static TX_MSG_RATE: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_vpn_tx_msg_rate",
        "Current egress rate in messages per second",
        LABELS,
    ))
});

static FIELDS: LazyLock<Vec<Field<VpnRow>>> = LazyLock::new(|| {
    let rx_msgs = Arc::new(MetricDesc::counter(
        "broker_vpn_rx_msgs_total",
        "Client data messages received",
        LABELS,
    ));
    let tx_msgs = Arc::new(MetricDesc::counter(
        "broker_vpn_tx_msgs_total",
        "Client data messages sent",
        LABELS,
    ));
    let rx_bytes = Arc::new(MetricDesc::counter(
        "broker_vpn_rx_bytes_total",
        "Client data bytes received",
        LABELS,
    ));
    let tx_bytes = Arc::new(MetricDesc::counter(
        "broker_vpn_tx_bytes_total",
        "Client data bytes sent",
        LABELS,
    ));

    vec![
        Field::new("rx_msgs", &rx_msgs, |r: &VpnRow| r.rx_msgs),
        Field::new("tx_msgs", &tx_msgs, |r: &VpnRow| r.tx_msgs),
        Field::new("rx_bytes", &rx_bytes, |r: &VpnRow| r.rx_bytes),
        Field::new("tx_bytes", &tx_bytes, |r: &VpnRow| r.tx_bytes),
        Field::new("rx_rate", &RX_MSG_RATE, |r: &VpnRow| r.rx_rate),
        Field::new("tx_rate", &TX_MSG_RATE, |r: &VpnRow| r.tx_rate),
    ]
});

#[derive(Debug, Deserialize)]
struct Rpc {
    show: Show,
}

#[derive(Debug, Deserialize)]
struct Show {
    #[serde(rename = "message-vpn")]
    message_vpn: MessageVpn,
}

#[derive(Debug, Default, Deserialize)]
struct MessageVpn {
    #[serde(default)]
    vpn: Vec<Vpn>,
}

#[derive(Debug, Deserialize)]
struct Vpn {
    name: String,
    #[serde(default)]
    stats: Option<VpnStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VpnStats {
    client_data_messages_received: Option<f64>,
    client_data_messages_sent: Option<f64>,
    client_data_bytes_received: Option<f64>,
    client_data_bytes_sent: Option<f64>,
    current_ingress_rate_per_second: Option<f64>,
    current_egress_rate_per_second: Option<f64>,
}

/// One message VPN's statistics
#[derive(Debug, Clone, PartialEq)]
pub struct VpnRow {
    pub name: String,
    pub rx_msgs: Option<f64>,
    pub tx_msgs: Option<f64>,
    pub rx_bytes: Option<f64>,
    pub tx_bytes: Option<f64>,
    pub rx_rate: Option<f64>,
    pub tx_rate: Option<f64>,
}

impl From<Vpn> for VpnRow {
    fn from(vpn: Vpn) -> Self {
        let stats = vpn.stats.unwrap_or_default();
        Self {
            name: vpn.name,
            rx_msgs: stats.client_data_messages_received,
            tx_msgs: stats.client_data_messages_sent,
            rx_bytes: stats.client_data_bytes_received,
            tx_bytes: stats.client_data_bytes_sent,
            rx_rate: stats.current_ingress_rate_per_second,
            tx_rate: stats.current_egress_rate_per_second,
        }
    }
}

/// `show message-vpn <scope> stats`, paged
pub struct VpnStatsQuery {
    command: String,
}

impl VpnStatsQuery {
    pub fn new(source: &DataSource, page_size: u32) -> Self {
        Self {
            command: ShowCommand::new("message-vpn")
                .arg("vpn-name", &source.scope)
                .flag("stats")
                .paged(page_size)
                .to_xml(),
        }
    }
}

impl PagedQuery for VpnStatsQuery {
    type Row = VpnRow;

    fn first_request(&self) -> BrokerRequest {
        BrokerRequest::Command {
            body: self.command.clone(),
        }
    }

    fn next_request(&self, cursor: &str) -> BrokerRequest {
        BrokerRequest::Command {
            body: cursor.to_string(),
        }
    }

    fn decode(&self, response: &BrokerResponse) -> Result<Page<VpnRow>> {
        let reply = decode_reply::<Rpc>(&response.body)?;
        let rows = reply
            .payload
            .show
            .message_vpn
            .vpn
            .into_iter()
            .map(VpnRow::from)
            .collect();
        Ok(Page::new(rows, reply.more_cookie))
    }

    fn row_key(&self, row: &VpnRow) -> String {
        row.name.clone()
    }
}

pub struct VpnStatsCollector;

#[async_trait]
impl Collector for VpnStatsCollector {
    fn family(&self) -> &'static str {
        FAMILY
    }

    fn field_names(&self) -> Vec<&'static str> {
        field_names(&FIELDS)
    }

    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let rows = ctx.query(&VpnStatsQuery::new(source, ctx.page_size())).await?;
        debug!("{} returned {} VPNs", source, rows.len());

        for row in &rows {
            emit_row(&FIELDS, source, row, &[row.name.as_str()], sink)?;
        }
        Ok(())
    }
}
