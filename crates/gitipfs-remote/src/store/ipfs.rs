//! Content store backed by the HTTP API of an IPFS daemon.

use super::{ContentStore, Link, LinkKind, StoreResult};
use crate::error::TransportError;
use reqwest::blocking::{multipart, Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// UnixFS node type of a directory in `ls` output.
const UNIXFS_DIRECTORY: i32 = 1;
/// UnixFS node type of a file in `ls` output.
const UNIXFS_FILE: i32 = 2;

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Type", default)]
    kind: i32,
}

impl From<LsLink> for Link {
    fn from(link: LsLink) -> Self {
        let kind = match link.kind {
            UNIXFS_DIRECTORY => LinkKind::Directory,
            UNIXFS_FILE => LinkKind::File,
            _ => LinkKind::Other,
        };
        Self {
            name: link.name,
            hash: link.hash,
            size: link.size,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HashResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Client for the `/api/v0` HTTP interface of an IPFS daemon.
#[derive(Debug, Clone)]
pub struct IpfsClient {
    client: Client,
    api_url: String,
}

impl IpfsClient {
    /// Creates a client for the daemon at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("git-remote-ipfs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.api_url)
    }

    /// Sends an API command. Every command is a POST.
    fn call(&self, command: &str, query: &[(&str, &str)], subject: &str) -> StoreResult<Response> {
        tracing::debug!(command, subject, "api request");
        let response = self.client.post(self.endpoint(command)).query(query).send()?;
        check(response, subject)
    }
}

/// Turns an error status into a `TransportError`.
fn check(response: Response, subject: &str) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(error_for(status, body, subject))
}

/// Maps a failed response onto a `TransportError`.
///
/// Only a JSON error body from the daemon can mean a missing path. A 404 is
/// the HTTP server rejecting the API route, which points at a bad `api_url`.
fn error_for(status: StatusCode, body: String, subject: &str) -> TransportError {
    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(error) if status != StatusCode::NOT_FOUND && is_missing(&error.message) => {
            return TransportError::NotFound {
                path: subject.to_string(),
            };
        }
        Ok(error) => error.message,
        Err(_) => body,
    };
    TransportError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Returns true for the daemon's ways of saying a path does not exist.
fn is_missing(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("no link named")
        || message.contains("merkledag: not found")
        || message.contains("does not exist")
}

fn decode<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
    let body = response.text()?;
    serde_json::from_str(&body).map_err(|e| TransportError::Decode(format!("{e}: {body}")))
}

impl ContentStore for IpfsClient {
    fn cat(&self, path: &str) -> StoreResult<Vec<u8>> {
        let response = self.call("cat", &[("arg", path)], path)?;
        Ok(response.bytes()?.to_vec())
    }

    fn cat_range(&self, path: &str, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        let offset = offset.to_string();
        let length = len.to_string();
        let response = self.call(
            "cat",
            &[("arg", path), ("offset", &offset), ("length", &length)],
            path,
        )?;
        Ok(response.bytes()?.to_vec())
    }

    fn ls(&self, path: &str) -> StoreResult<Vec<Link>> {
        let response = self.call("ls", &[("arg", path)], path)?;
        let listing: LsResponse = decode(response)?;
        Ok(listing
            .objects
            .into_iter()
            .flat_map(|object| object.links)
            .map(Link::from)
            .collect())
    }

    fn add(&self, data: &[u8]) -> StoreResult<String> {
        let part = multipart::Part::bytes(data.to_vec()).file_name("object");
        let form = multipart::Form::new().part("file", part);
        tracing::debug!(size = data.len(), "api request add");
        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()?;
        let added: HashResponse = decode(check(response, "add")?)?;
        Ok(added.hash)
    }

    fn patch_link(&self, root: &str, name: &str, target: &str) -> StoreResult<String> {
        let response = self.call(
            "object/patch/add-link",
            &[
                ("arg", root),
                ("arg", name),
                ("arg", target),
                ("create", "true"),
            ],
            root,
        )?;
        let patched: HashResponse = decode(response)?;
        Ok(patched.hash)
    }
}
