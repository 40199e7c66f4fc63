use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("error fetching data from POEM: {0}")]
    Poem(#[source] reqwest::Error),
    #[error("error fetching data from WebAPI: {0}")]
    WebApi(#[source] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("could not decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("could not parse {}: {source}", path.display())]
    IniParse {
        path: PathBuf,
        source: ini::ParseError,
    },
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
