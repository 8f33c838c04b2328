use serde::{Deserialize, Serialize};

const MASK: &str = "***";

/// Database connection details safe to write into run artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub engine: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub redacted: String,
}

/// Mask the password and secret query parameters of a connection URL.
pub fn redact_connection(conn: &str) -> RedactedConnection {
    let mut out = RedactedConnection {
        engine: None,
        user: None,
        host: None,
        port: None,
        database: None,
        redacted: conn.to_string(),
    };

    if let Some(scheme_end) = conn.find("://") {
        out.engine = Some(conn[..scheme_end].to_string());
        let authority_start = scheme_end + 3;
        let rest = &conn[authority_start..];
        let location_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let location = &rest[..location_end];

        let host_port = match location.rfind('@') {
            Some(at) => {
                let credentials = &location[..at];
                match credentials.split_once(':') {
                    Some((user, _)) => {
                        out.user = Some(user.to_string());
                        let start = authority_start + user.len() + 1;
                        out.redacted
                            .replace_range(start..authority_start + at, MASK);
                    }
                    None => out.user = Some(credentials.to_string()),
                }
                &location[at + 1..]
            }
            None => location,
        };

        match host_port.rsplit_once(':') {
            Some((host, port)) => {
                out.host = Some(host.to_string());
                out.port = port.parse().ok();
            }
            None if !host_port.is_empty() => out.host = Some(host_port.to_string()),
            None => {}
        }

        let database = rest[location_end..]
            .strip_prefix('/')
            .map(|path| path.split('?').next().unwrap_or_default())
            .filter(|name| !name.is_empty());
        out.database = database.map(str::to_string);
    }

    out.redacted = redact_query(&out.redacted);
    out
}

fn redact_query(conn: &str) -> String {
    let Some((base, query)) = conn.split_once('?') else {
        return conn.to_string();
    };
    let params: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_secret(key) => format!("{key}={MASK}"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}?{}", params.join("&"))
}

fn is_secret(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "password" | "pass" | "token" | "api_key" | "apikey" | "sslpassword"
    )
}
