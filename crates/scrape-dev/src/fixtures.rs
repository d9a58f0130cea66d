//! Broker reply fixtures
//!
//! Builders for XML and JSON replies shaped like the broker's, for scripting
//! a [`MockBroker`](crate::MockBroker).

use scrape_core::BrokerResponse;
use serde_json::{json, Value};

/// Wrap a `<show>` payload in an `ok` rpc-reply, with an optional next request
pub fn xml_reply(payload: &str, more_cookie: Option<&str>) -> BrokerResponse {
    let cookie = more_cookie
        .map(|c| format!("<more-cookie>{}</more-cookie>", c))
        .unwrap_or_default();
    BrokerResponse::ok(format!(
        "<rpc-reply semp-version=\"soltr/10_4\"><rpc><show>{}</show></rpc>{}\
         <execute-result code=\"ok\"/></rpc-reply>",
        payload, cookie
    ))
}

/// An rpc-reply rejected by the broker
pub fn xml_failure(reason: &str) -> BrokerResponse {
    BrokerResponse::ok(format!(
        "<rpc-reply semp-version=\"soltr/10_4\">\
         <execute-result code=\"fail\" reason=\"{}\"/></rpc-reply>",
        reason
    ))
}

/// `show version` payload
pub fn version_xml(load: &str, uptime_secs: u64) -> String {
    format!(
        "<version><description>Broker Enterprise</description>\
         <current-load>{}</current-load>\
         <uptime><days>{}</days><hours>{}</hours><mins>{}</mins><secs>{}</secs></uptime>\
         </version>",
        load,
        uptime_secs / 86_400,
        uptime_secs % 86_400 / 3_600,
        uptime_secs % 3_600 / 60,
        uptime_secs % 60
    )
}

/// One `<vpn>` row of `show message-vpn … stats`
pub fn vpn_row(name: &str, messages_received: u64) -> String {
    format!(
        "<vpn><name>{}</name><stats>\
         <client-data-messages-received>{}</client-data-messages-received>\
         <client-data-messages-sent>{}</client-data-messages-sent>\
         <client-data-bytes-received>{}</client-data-bytes-received>\
         <client-data-bytes-sent>{}</client-data-bytes-sent>\
         <current-ingress-rate-per-second>5</current-ingress-rate-per-second>\
         <current-egress-rate-per-second>7</current-egress-rate-per-second>\
         </stats></vpn>",
        name,
        messages_received,
        messages_received * 2,
        messages_received * 100,
        messages_received * 200
    )
}

/// `show message-vpn … stats` payload
pub fn vpns_xml(rows: &[String]) -> String {
    format!("<message-vpn>{}</message-vpn>", rows.concat())
}

/// One `<queue>` row of `show queue … stats`
pub fn queue_row(vpn: &str, name: &str, spooled_messages: u64) -> String {
    format!(
        "<queue><name>{}</name><info><message-vpn>{}</message-vpn>\
         <num-messages-spooled>{}</num-messages-spooled>\
         <current-spool-usage-in-mb>1.5</current-spool-usage-in-mb>\
         <bind-count>1</bind-count></info>\
         <stats><message-spool-stats>\
         <total-messages-spooled>{}</total-messages-spooled>\
         </message-spool-stats></stats></queue>",
        name,
        vpn,
        spooled_messages,
        spooled_messages * 10
    )
}

/// `show queue … stats` payload
pub fn queues_xml(rows: &[String]) -> String {
    format!("<queue><queues>{}</queues></queue>", rows.concat())
}

/// One `<client>` row of `show client … stats`
pub fn client_row(vpn: &str, name: &str, messages_received: u64) -> String {
    format!(
        "<client><name>{}</name><message-vpn>{}</message-vpn><stats>\
         <client-data-messages-received>{}</client-data-messages-received>\
         <client-data-messages-sent>{}</client-data-messages-sent>\
         <client-data-bytes-received>{}</client-data-bytes-received>\
         <client-data-bytes-sent>{}</client-data-bytes-sent>\
         </stats></client>",
        name,
        vpn,
        messages_received,
        messages_received,
        messages_received * 100,
        messages_received * 100
    )
}

/// `show client … stats` payload
pub fn clients_xml(rows: &[String]) -> String {
    format!(
        "<client><primary-virtual-router>{}</primary-virtual-router></client>",
        rows.concat()
    )
}

/// One page of a JSON monitor collection
pub fn json_page(data: Value, next_page_uri: Option<&str>) -> BrokerResponse {
    let mut meta = json!({ "responseCode": 200 });
    if let Some(next) = next_page_uri {
        meta["paging"] = json!({ "cursorQuery": "fixture", "nextPageUri": next });
    }
    BrokerResponse::ok(json!({ "data": data, "meta": meta }).to_string())
}

/// A JSON monitor error reply
pub fn json_error(status: u16, description: &str) -> BrokerResponse {
    BrokerResponse::new(
        status,
        json!({
            "meta": {
                "responseCode": status,
                "error": { "code": 1, "description": description, "status": "NOT_ALLOWED" }
            }
        })
        .to_string(),
    )
}

/// A `msgVpns` monitor object
pub fn json_vpn(name: &str, spool_usage: u64) -> Value {
    json!({
        "msgVpnName": name,
        "rxMsgRate": 10,
        "txMsgRate": 20,
        "msgSpoolUsage": spool_usage,
        "msgSpoolMsgCount": 3
    })
}

/// A `queues` monitor object
pub fn json_queue(vpn: &str, name: &str, spooled: u64) -> Value {
    json!({
        "msgVpnName": vpn,
        "queueName": name,
        "msgSpoolUsage": spooled * 1024,
        "spooledMsgCount": spooled,
        "bindCount": 1
    })
}
