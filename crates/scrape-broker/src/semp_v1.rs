//! XML command flavor of the management protocol
//!
//! Requests are `<rpc><show>…</show></rpc>` documents posted to the command
//! endpoint. Replies wrap the payload in `<rpc-reply>` together with an
//! `<execute-result>` status and, for paged commands, a `<more-cookie>`
//! holding the complete next request.

use quick_xml::escape::escape;
use scrape_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const MORE_COOKIE_OPEN: &str = "<more-cookie>";
const MORE_COOKIE_CLOSE: &str = "</more-cookie>";

/// Builder for a `show` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowCommand {
    target: String,
    args: Vec<(String, String)>,
    flags: Vec<String>,
    page_size: Option<u32>,
}

impl ShowCommand {
    /// Start a `show <target>` command
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            flags: Vec::new(),
            page_size: None,
        }
    }

    /// Add a valued argument such as `<vpn-name>default</vpn-name>`
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// Add an empty flag element such as `<stats/>`
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flags.push(name.into());
        self
    }

    /// Request paging with `page_size` rows per page
    pub fn paged(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Render the request document
    pub fn to_xml(&self) -> String {
        let mut inner = String::new();
        for (name, value) in &self.args {
            inner.push_str(&format!("<{0}>{1}</{0}>", name, escape(value.as_str())));
        }
        for flag in &self.flags {
            inner.push_str(&format!("<{}/>", flag));
        }
        if let Some(size) = self.page_size {
            inner.push_str(&format!("<count/><num-elements>{}</num-elements>", size));
        }

        if inner.is_empty() {
            format!("<rpc><show><{}/></show></rpc>", self.target)
        } else {
            format!("<rpc><show><{0}>{1}</{0}></show></rpc>", self.target, inner)
        }
    }
}

/// Decoded reply envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// Content of `<rpc>`
    pub payload: T,

    /// Next request document, when more rows remain
    pub more_cookie: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    rpc: Option<T>,
    #[serde(rename = "execute-result", default)]
    execute_result: Option<ExecuteResult>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResult {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "@reason", default)]
    reason: Option<String>,
}

/// Decode an `<rpc-reply>` whose `<rpc>` content maps onto `T`.
///
/// A non-`ok` execute result is an upstream rejection carrying the broker's
/// reason; anything that does not decode is a protocol error.
pub fn decode_reply<T: DeserializeOwned>(body: &str) -> Result<Reply<T>> {
    let reply: RpcReply<T> = quick_xml::de::from_str(body)
        .map_err(|e| Error::protocol(format!("Malformed rpc-reply: {}", e)))?;

    let result = reply
        .execute_result
        .ok_or_else(|| Error::protocol("rpc-reply has no execute-result"))?;
    if result.code != "ok" {
        return Err(Error::rejected(
            result
                .reason
                .filter(|r| !r.is_empty())
                .unwrap_or(result.code),
        ));
    }

    let payload = reply
        .rpc
        .ok_or_else(|| Error::protocol("rpc-reply has no rpc payload"))?;

    Ok(Reply {
        payload,
        more_cookie: extract_more_cookie(body)?,
    })
}

/// Inner XML of `<more-cookie>`, verbatim; `None` when absent or empty
pub fn extract_more_cookie(body: &str) -> Result<Option<String>> {
    let Some(start) = body.find(MORE_COOKIE_OPEN) else {
        return Ok(None);
    };
    let start = start + MORE_COOKIE_OPEN.len();
    let end = body[start..]
        .find(MORE_COOKIE_CLOSE)
        .ok_or_else(|| Error::protocol("Unterminated more-cookie"))?;

    let cookie = body[start..start + end].trim();
    if cookie.is_empty() {
        Ok(None)
    } else {
        Ok(Some(cookie.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_core::ErrorKind;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rpc {
        show: Show,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Show {
        version: Version,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Version {
        #[serde(rename = "current-load")]
        current_load: String,
    }

    #[test]
    fn test_show_command_rendering() {
        let xml = ShowCommand::new("queue")
            .arg("name", "orders*")
            .arg("vpn-name", "default")
            .flag("stats")
            .paged(100)
            .to_xml();
        assert_eq!(
            xml,
            "<rpc><show><queue><name>orders*</name><vpn-name>default</vpn-name><stats/>\
             <count/><num-elements>100</num-elements></queue></show></rpc>"
        );

        assert_eq!(
            ShowCommand::new("version").to_xml(),
            "<rpc><show><version/></show></rpc>"
        );
    }

    #[test]
    fn test_show_command_escapes_values() {
        let xml = ShowCommand::new("client").arg("name", "a<b&c").to_xml();
        assert!(xml.contains("<name>a&lt;b&amp;c</name>"));
    }

    #[test]
    fn test_decode_ok_reply() {
        let body = r#"<rpc-reply semp-version="soltr/10_4">
            <rpc><show><version><current-load>soltr_10.4.1</current-load></version></show></rpc>
            <execute-result code="ok"/>
        </rpc-reply>"#;

        let reply: Reply<Rpc> = decode_reply(body).unwrap();
        assert_eq!(reply.payload.show.version.current_load, "soltr_10.4.1");
        assert_eq!(reply.more_cookie, None);
    }

    #[test]
    fn test_decode_reply_with_cookie() {
        let body = r#"<rpc-reply semp-version="soltr/10_4">
            <rpc><show><version><current-load>x</current-load></version></show></rpc>
            <more-cookie>
              <rpc><show><queue><name>*</name><count/><num-elements>2</num-elements><last-name>q2</last-name></queue></show></rpc>
            </more-cookie>
            <execute-result code="ok"/>
        </rpc-reply>"#;

        let reply: Reply<Rpc> = decode_reply(body).unwrap();
        assert_eq!(
            reply.more_cookie.as_deref(),
            Some(
                "<rpc><show><queue><name>*</name><count/><num-elements>2</num-elements>\
                 <last-name>q2</last-name></queue></show></rpc>"
            )
        );
    }

    #[test]
    fn test_decode_failed_reply() {
        let body = r#"<rpc-reply semp-version="soltr/10_4">
            <parse-error>unknown command</parse-error>
            <execute-result code="fail" reason="Unknown VPN" reason-code="7"/>
        </rpc-reply>"#;

        let err = decode_reply::<Rpc>(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamRejected);
        assert!(err.to_string().contains("Unknown VPN"));
    }

    #[test]
    fn test_decode_malformed_reply() {
        let err = decode_reply::<Rpc>("<rpc-reply><rpc>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let missing_result =
            "<rpc-reply><rpc><show><version><current-load>x</current-load></version></show></rpc></rpc-reply>";
        let err = decode_reply::<Rpc>(missing_result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_extract_more_cookie_edge_cases() {
        assert_eq!(extract_more_cookie("<rpc-reply/>").unwrap(), None);
        assert_eq!(
            extract_more_cookie("<more-cookie>  </more-cookie>").unwrap(),
            None
        );
        assert!(extract_more_cookie("<more-cookie><rpc>").is_err());
    }
}
