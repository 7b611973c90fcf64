use url::Url;

use crate::error::ProbeError;

const UDP_PROXY_MARKER: &str = "/udp/";
const RTMP_DEFAULT_PORT: u16 = 1935;
const RTSP_DEFAULT_PORT: u16 = 554;

/// The parsed form of a candidate URL, deciding which probes apply to it.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Http(Url),
    /// An HTTP relay for a multicast group, e.g. `http://relay:4022/udp/239.1.1.1:5000`.
    UdpProxy { url: Url, address: String },
    Udp { address: String },
    Rtmp { host: String, port: u16 },
    Rtsp { host: String, port: u16 },
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ProbeError> {
        let url = Url::parse(raw.trim()).map_err(|e| ProbeError::InvalidUrl(format!("{raw}: {e}")))?;

        match url.scheme() {
            "http" | "https" => match udp_proxy_address(&url) {
                Some(address) => Ok(Target::UdpProxy { url, address }),
                None => Ok(Target::Http(url)),
            },
            "udp" | "rtp" => {
                let host = host_of(&url, raw)?;
                let port = url
                    .port()
                    .ok_or_else(|| ProbeError::InvalidUrl(format!("{raw}: missing port")))?;
                Ok(Target::Udp {
                    address: format!("{host}:{port}"),
                })
            }
            "rtmp" | "rtmps" => Ok(Target::Rtmp {
                host: host_of(&url, raw)?,
                port: url.port().unwrap_or(RTMP_DEFAULT_PORT),
            }),
            "rtsp" => Ok(Target::Rtsp {
                host: host_of(&url, raw)?,
                port: url.port().unwrap_or(RTSP_DEFAULT_PORT),
            }),
            other => Err(ProbeError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Target::Http(_) | Target::UdpProxy { .. })
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Target::Udp { .. } | Target::UdpProxy { .. })
    }

    /// Address to dial for socket based targets.
    pub fn socket_address(&self) -> Option<String> {
        match self {
            Target::Udp { address } | Target::UdpProxy { address, .. } => Some(address.clone()),
            Target::Rtmp { host, port } | Target::Rtsp { host, port } => Some(format!("{host}:{port}")),
            Target::Http(_) => None,
        }
    }

    /// Short protocol name used in diagnostics.
    pub fn protocol(&self) -> &'static str {
        match self {
            Target::Http(_) => "HTTP",
            Target::UdpProxy { .. } | Target::Udp { .. } => "UDP",
            Target::Rtmp { .. } => "RTMP",
            Target::Rtsp { .. } => "RTSP",
        }
    }
}

fn host_of(url: &Url, raw: &str) -> Result<String, ProbeError> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProbeError::InvalidUrl(format!("{raw}: missing host")))
}

fn udp_proxy_address(url: &Url) -> Option<String> {
    let path = url.path();
    let start = path.find(UDP_PROXY_MARKER)? + UDP_PROXY_MARKER.len();
    let rest = &path[start..];
    let address = rest.split('/').next().unwrap_or_default();
    (!address.is_empty()).then(|| address.to_string())
}
