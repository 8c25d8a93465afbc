//! Server entries.

/// A server on the network.
#[derive(Debug, Clone)]
pub struct Server {
    pub name: String,
    pub description: String,
    /// SID or P10 numeric. `None` on Unreal.
    pub sid: Option<String>,
    pub hops: u32,
    /// Key of the server that introduced this one; `None` for our uplink.
    pub uplink: Option<String>,
    /// Keys of users introduced by this server, in introduction order.
    pub users: Vec<String>,
}

impl Server {
    pub fn new(name: impl Into<String>, description: impl Into<String>, hops: u32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sid: None,
            hops,
            uplink: None,
            users: Vec::new(),
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn behind(mut self, uplink: impl Into<String>) -> Self {
        self.uplink = Some(uplink.into());
        self
    }

    /// Registry key: the id if there is one, else the lowercased name.
    pub fn key(&self) -> String {
        match &self.sid {
            Some(sid) => sid.clone(),
            None => self.name.to_ascii_lowercase(),
        }
    }
}
