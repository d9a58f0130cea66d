//! `ClientStats`: per-client traffic counters

use crate::collector::{emit_row, field_names, CollectContext, Collector, Field};
use async_trait::async_trait;
use scrape_broker::{decode_reply, Page, PagedQuery, ShowCommand};
use scrape_core::{BrokerRequest, BrokerResponse, DataSource, MetricDesc, MetricSink, Result};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const FAMILY: &str = "ClientStats";

const LABELS: &[&str] = &["vpn_name", "client_name"];

static FIELDS: LazyLock<Vec<Field<ClientRow>>> = LazyLock::new(|| {
    let counter = |name: &str, help: &str| Arc::new(MetricDesc::counter(name, help, LABELS));

    vec![
        Field::new(
            "rx_msgs",
            &counter("broker_client_rx_msgs_total", "Data messages received from the client"),
            |r: &ClientRow| r.rx_msgs,
        ),
        Field::new(
            "tx_msgs",
            &counter("broker_client_tx_msgs_total", "Data messages sent to the client"),
            |r: &ClientRow| r.tx_msgs,
        ),
        Field::new(
            "rx_bytes",
            &counter("broker_client_rx_bytes_total", "Data bytes received from the client"),
            |r: &ClientRow| r.rx_bytes,
        ),
        Field::new(
            "tx_bytes",
            &counter("broker_client_tx_bytes_total", "Data bytes sent to the client"),
            |r: &ClientRow| r.tx_bytes,
        ),
    ]
});

#[derive(Debug, Deserialize)]
struct Rpc {
    show: Show,
}

#[derive(Debug, Deserialize)]
struct Show {
    client: ClientShow,
}

#[derive(Debug, Default, Deserialize)]
struct ClientShow {
    #[serde(rename = "primary-virtual-router", default)]
    primary_virtual_router: Option<Router>,
}

#[derive(Debug, Default, Deserialize)]
struct Router {
    #[serde(default)]
    client: Vec<Client>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Client {
    name: String,
    message_vpn: String,
    #[serde(default)]
    stats: Option<ClientStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClientStats {
    client_data_messages_received: Option<f64>,
    client_data_messages_sent: Option<f64>,
    client_data_bytes_received: Option<f64>,
    client_data_bytes_sent: Option<f64>,
}

/// One client's statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRow {
    pub vpn: String,
    pub name: String,
    pub rx_msgs: Option<f64>,
    pub tx_msgs: Option<f64>,
    pub rx_bytes: Option<f64>,
    pub tx_bytes: Option<f64>,
}

impl From<Client> for ClientRow {
    fn from(client: Client) -> Self {
        let stats = client.stats.unwrap_or_default();
        Self {
            vpn: client.message_vpn,
            name: client.name,
            rx_msgs: stats.client_data_messages_received,
            tx_msgs: stats.client_data_messages_sent,
            rx_bytes: stats.client_data_bytes_received,
            tx_bytes: stats.client_data_bytes_sent,
        }
    }
}

/// `show client <item> message-vpn <scope> stats`, paged
pub struct ClientStatsQuery {
    command: String,
}

impl ClientStatsQuery {
    pub fn new(source: &DataSource, page_size: u32) -> Self {
        Self {
            command: ShowCommand::new("client")
                .arg("name", &source.item)
                .arg("vpn-name", &source.scope)
                .flag("stats")
                .paged(page_size)
                .to_xml(),
        }
    }
}

impl PagedQuery for ClientStatsQuery {
    type Row = ClientRow;

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

    fn decode(&self, response: &BrokerResponse) -> Result<Page<ClientRow>> {
        let reply = decode_reply::<Rpc>(&response.body)?;
        let rows = reply
            .payload
            .show
            .client
            .primary_virtual_router
            .unwrap_or_default()
            .client
            .into_iter()
            .map(ClientRow::from)
            .collect();
        Ok(Page::new(rows, reply.more_cookie))
    }

    fn row_key(&self, row: &ClientRow) -> String {
        format!("{}/{}", row.vpn, row.name)
    }
}

pub struct ClientStatsCollector;

#[async_trait]
impl Collector for ClientStatsCollector {
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
        let rows = ctx.query(&ClientStatsQuery::new(source, ctx.page_size())).await?;
        debug!("{} returned {} clients", source, rows.len());

        for row in &rows {
            emit_row(&FIELDS, source, row, &[row.vpn.as_str(), row.name.as_str()], sink)?;
        }
        Ok(())
    }
}
