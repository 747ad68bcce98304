use std::error;
use std::fmt;
use std::io;
use std::str;

use tokio::time::error::Elapsed;

/// Machine-checkable class of a failed gateway interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Gateway discovery itself failed; nothing can be iterated.
    Discovery,
    /// The gateway could not be reached or did not answer in time.
    Transport,
    /// The gateway answered with a fault, or with something we could not use.
    Protocol,
    /// The mapping, or the enumeration index, does not exist.
    NotFound,
    /// The request was rejected before being sent.
    Validation,
    /// A chained step was not attempted because its predecessor failed.
    Skipped,
    /// The run was cancelled before or while the step executed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ErrorKind::Discovery => "discovery failure",
            ErrorKind::Transport => "transport error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Validation => "validation error",
            ErrorKind::Skipped => "skipped",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

/// The error half of every gateway interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl OperationError {
    pub fn new<S: Into<String>>(kind: ErrorKind, detail: S) -> OperationError {
        OperationError {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl error::Error for OperationError {}

/// Universal return shape of gateway interactions.
pub type OperationResult<T> = Result<T, OperationError>;

/// Errors that can occur when sending the request to the gateway.
#[derive(Debug)]
pub enum RequestError {
    /// Http/Hyper error
    HttpError(hyper::Error),
    /// The request could not be built.
    InvalidRequest(http::Error),
    /// IO Error
    IoError(io::Error),
    /// The gateway did not answer within the configured timeout.
    Timeout,
    /// The response from the gateway could not be parsed.
    InvalidResponse(String),
    /// The gateway returned an unhandled error code and description.
    ErrorCode(u16, String),
}

/// Errors returned by `Gateway::get_external_ip`
#[derive(Debug)]
pub enum GetExternalIpError {
    /// The client is not authorized to perform the operation.
    ActionNotAuthorized,
    /// Some other error occured performing the request.
    RequestError(RequestError),
}

/// Errors returned by `Gateway::remove_port`
#[derive(Debug)]
pub enum RemovePortError {
    /// The client is not authorized to perform the operation.
    ActionNotAuthorized,
    /// No such port mapping.
    NoSuchPortMapping,
    /// Some other error occured performing the request.
    RequestError(RequestError),
}

/// Errors returned by `Gateway::add_port`
#[derive(Debug)]
pub enum AddPortError {
    /// The client is not authorized to perform the operation.
    ActionNotAuthorized,
    /// The requested mapping conflicts with a mapping assigned to another client.
    PortInUse,
    /// The gateway requires that the requested internal and external ports are the same.
    SamePortValuesRequired,
    /// The gateway only supports permanent leases (ie. a `lease_duration` of 0).
    OnlyPermanentLeasesSupported,
    /// The description was too long for the gateway to handle.
    DescriptionTooLong,
    /// The internal client could not be determined.
    NoLocalAddress(io::Error),
    /// Some other error occured performing the request.
    RequestError(RequestError),
}

/// Errors returned by `Gateway::get_generic_port_mapping_entry`
#[derive(Debug)]
pub enum GetGenericPortMappingEntryError {
    /// The client is not authorized to perform the operation.
    ActionNotAuthorized,
    /// The specified array index is out of bounds.
    SpecifiedArrayIndexInvalid,
    /// Some other error occured performing the request.
    RequestError(RequestError),
}

/// Errors returned by `Gateway::get_list_of_port_mappings`
#[derive(Debug)]
pub enum GetListOfPortMappingsError {
    /// The client is not authorized to perform the operation.
    ActionNotAuthorized,
    /// The gateway only implements the first generation of the service.
    NotSupported,
    /// The gateway rejected the requested port range.
    InconsistentParameters,
    /// Some other error occured performing the request.
    RequestError(RequestError),
}

/// Errors than can occur while trying to find the gateway.
#[derive(Debug)]
pub enum SearchError {
    /// Http/Hyper error
    HttpError(hyper::Error),
    /// Unable to process the response
    InvalidResponse,
    /// IO Error
    IoError(io::Error),
    /// UTF-8 decoding error
    Utf8Error(str::Utf8Error),
    /// XML processing error
    XmlError(xmltree::ParseError),
    /// Invalid URI error
    InvalidUri(http::uri::InvalidUri),
    /// The search was cancelled.
    Cancelled,
}

impl From<io::Error> for RequestError {
    fn from(err: io::Error) -> RequestError {
        RequestError::IoError(err)
    }
}

impl From<hyper::Error> for RequestError {
    fn from(err: hyper::Error) -> RequestError {
        RequestError::HttpError(err)
    }
}

impl From<http::Error> for RequestError {
    fn from(err: http::Error) -> RequestError {
        RequestError::InvalidRequest(err)
    }
}

impl From<Elapsed> for RequestError {
    fn from(_err: Elapsed) -> RequestError {
        RequestError::Timeout
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RequestError::HttpError(ref e) => write!(f, "HTTP error. {}", e),
            RequestError::InvalidRequest(ref e) => write!(f, "Invalid request. {}", e),
            RequestError::InvalidResponse(ref e) => write!(f, "Invalid response from gateway: {}", e),
            RequestError::IoError(ref e) => write!(f, "IO error. {}", e),
            RequestError::Timeout => write!(f, "The gateway did not respond in time"),
            RequestError::ErrorCode(n, ref e) => write!(f, "Gateway response error {}: {}", n, e),
        }
    }
}

impl error::Error for RequestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            RequestError::HttpError(ref e) => Some(e),
            RequestError::InvalidRequest(ref e) => Some(e),
            RequestError::IoError(ref e) => Some(e),
            RequestError::InvalidResponse(..) | RequestError::Timeout | RequestError::ErrorCode(..) => None,
        }
    }
}

impl fmt::Display for GetExternalIpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GetExternalIpError::ActionNotAuthorized
                => write!(f, "The client is not authorized to query the external address"),
            GetExternalIpError::RequestError(ref e)
                => write!(f, "Request Error. {}", e),
        }
    }
}

impl error::Error for GetExternalIpError {}

impl fmt::Display for RemovePortError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RemovePortError::ActionNotAuthorized
                => write!(f, "The client is not authorized to remove the port"),
            RemovePortError::NoSuchPortMapping
                => write!(f, "The port was not mapped"),
            RemovePortError::RequestError(ref e)
                => write!(f, "Request error. {}", e),
        }
    }
}

impl error::Error for RemovePortError {}

impl fmt::Display for AddPortError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AddPortError::ActionNotAuthorized
                => write!(f, "The client is not authorized to map this port."),
            AddPortError::PortInUse
                => write!(f, "The requested mapping conflicts with a mapping assigned to another client."),
            AddPortError::SamePortValuesRequired
                => write!(f, "The gateway requires that the requested internal and external ports are the same."),
            AddPortError::OnlyPermanentLeasesSupported
                => write!(f, "The gateway only supports permanent leases (ie. a `lease_duration` of 0)."),
            AddPortError::DescriptionTooLong
                => write!(f, "The description was too long for the gateway to handle."),
            AddPortError::NoLocalAddress(ref e)
                => write!(f, "Could not determine the local address facing the gateway. {}", e),
            AddPortError::RequestError(ref e)
                => write!(f, "Request error. {}", e),
        }
    }
}

impl error::Error for AddPortError {}

impl fmt::Display for GetGenericPortMappingEntryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GetGenericPortMappingEntryError::ActionNotAuthorized
                => write!(f, "The client is not authorized to look up port mappings"),
            GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid
                => write!(f, "The provided index into the port mapping list is invalid"),
            GetGenericPortMappingEntryError::RequestError(ref e)
                => write!(f, "Request error. {}", e),
        }
    }
}

impl error::Error for GetGenericPortMappingEntryError {}

impl fmt::Display for GetListOfPortMappingsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GetListOfPortMappingsError::ActionNotAuthorized
                => write!(f, "The client is not authorized to list port mappings"),
            GetListOfPortMappingsError::NotSupported
                => write!(f, "Range queries are unsupported by this gateway's protocol version"),
            GetListOfPortMappingsError::InconsistentParameters
                => write!(f, "The gateway rejected the requested port range"),
            GetListOfPortMappingsError::RequestError(ref e)
                => write!(f, "Request error. {}", e),
        }
    }
}

impl error::Error for GetListOfPortMappingsError {}

impl From<RequestError> for GetGenericPortMappingEntryError {
    fn from(err: RequestError) -> GetGenericPortMappingEntryError {
        match err {
            RequestError::ErrorCode(606, _) => GetGenericPortMappingEntryError::ActionNotAuthorized,
            RequestError::ErrorCode(713, _) => GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid,
            other => GetGenericPortMappingEntryError::RequestError(other),
        }
    }
}

impl From<io::Error> for SearchError {
    fn from(err: io::Error) -> SearchError {
        SearchError::IoError(err)
    }
}

impl From<str::Utf8Error> for SearchError {
    fn from(err: str::Utf8Error) -> SearchError {
        SearchError::Utf8Error(err)
    }
}

impl From<xmltree::ParseError> for SearchError {
    fn from(err: xmltree::ParseError) -> SearchError {
        SearchError::XmlError(err)
    }
}

impl From<hyper::Error> for SearchError {
    fn from(err: hyper::Error) -> SearchError {
        SearchError::HttpError(err)
    }
}

impl From<http::uri::InvalidUri> for SearchError {
    fn from(err: http::uri::InvalidUri) -> SearchError {
        SearchError::InvalidUri(err)
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SearchError::HttpError(ref e) => write!(f, "HTTP error {}", e),
            SearchError::InvalidResponse => write!(f, "Invalid response"),
            SearchError::IoError(ref e) => write!(f, "IO error: {}", e),
            SearchError::Utf8Error(ref e) => write!(f, "UTF-8 error: {}", e),
            SearchError::XmlError(ref e) => write!(f, "XML error: {}", e),
            SearchError::InvalidUri(ref e) => write!(f, "Invalid URI: {}", e),
            SearchError::Cancelled => write!(f, "Search was cancelled"),
        }
    }
}

impl error::Error for SearchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            SearchError::HttpError(ref e) => Some(e),
            SearchError::IoError(ref e) => Some(e),
            SearchError::Utf8Error(ref e) => Some(e),
            SearchError::XmlError(ref e) => Some(e),
            SearchError::InvalidUri(ref e) => Some(e),
            SearchError::InvalidResponse | SearchError::Cancelled => None,
        }
    }
}

fn request_kind(err: &RequestError) -> ErrorKind {
    match *err {
        RequestError::HttpError(..) | RequestError::IoError(..) | RequestError::Timeout => ErrorKind::Transport,
        RequestError::InvalidRequest(..) => ErrorKind::Validation,
        RequestError::InvalidResponse(..) | RequestError::ErrorCode(..) => ErrorKind::Protocol,
    }
}

impl From<RequestError> for OperationError {
    fn from(err: RequestError) -> OperationError {
        OperationError::new(request_kind(&err), err.to_string())
    }
}

impl From<SearchError> for OperationError {
    fn from(err: SearchError) -> OperationError {
        let kind = match err {
            SearchError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Discovery,
        };
        OperationError::new(kind, err.to_string())
    }
}

impl From<GetExternalIpError> for OperationError {
    fn from(err: GetExternalIpError) -> OperationError {
        match err {
            GetExternalIpError::RequestError(e) => e.into(),
            e => OperationError::new(ErrorKind::Protocol, e.to_string()),
        }
    }
}

impl From<AddPortError> for OperationError {
    fn from(err: AddPortError) -> OperationError {
        match err {
            AddPortError::RequestError(e) => e.into(),
            e @ AddPortError::NoLocalAddress(..) => OperationError::new(ErrorKind::Transport, e.to_string()),
            e => OperationError::new(ErrorKind::Protocol, e.to_string()),
        }
    }
}

impl From<RemovePortError> for OperationError {
    fn from(err: RemovePortError) -> OperationError {
        match err {
            RemovePortError::RequestError(e) => e.into(),
            e @ RemovePortError::NoSuchPortMapping => OperationError::new(ErrorKind::NotFound, e.to_string()),
            e => OperationError::new(ErrorKind::Protocol, e.to_string()),
        }
    }
}

impl From<GetGenericPortMappingEntryError> for OperationError {
    fn from(err: GetGenericPortMappingEntryError) -> OperationError {
        match err {
            GetGenericPortMappingEntryError::RequestError(e) => e.into(),
            e @ GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid => {
                OperationError::new(ErrorKind::NotFound, e.to_string())
            }
            e => OperationError::new(ErrorKind::Protocol, e.to_string()),
        }
    }
}

impl From<GetListOfPortMappingsError> for OperationError {
    fn from(err: GetListOfPortMappingsError) -> OperationError {
        match err {
            GetListOfPortMappingsError::RequestError(e) => e.into(),
            e @ GetListOfPortMappingsError::InconsistentParameters => {
                OperationError::new(ErrorKind::Validation, e.to_string())
            }
            e => OperationError::new(ErrorKind::Protocol, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_out_of_range_is_not_found() {
        let err = GetGenericPortMappingEntryError::from(RequestError::ErrorCode(713, "SpecifiedArrayIndexInvalid".into()));
        assert_eq!(OperationError::from(err).kind, ErrorKind::NotFound);
    }

    #[test]
    fn missing_mapping_is_not_found() {
        assert_eq!(OperationError::from(RemovePortError::NoSuchPortMapping).kind, ErrorKind::NotFound);
    }

    #[test]
    fn timeouts_are_transport_errors() {
        let err = OperationError::from(GetExternalIpError::RequestError(RequestError::Timeout));
        assert_eq!(err.kind, ErrorKind::Transport);
    }

    #[test]
    fn gateway_faults_are_protocol_errors() {
        let err = OperationError::from(AddPortError::RequestError(RequestError::ErrorCode(501, "ActionFailed".into())));
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert_eq!(err.detail, "Gateway response error 501: ActionFailed");
        assert_eq!(OperationError::from(GetListOfPortMappingsError::NotSupported).kind, ErrorKind::Protocol);
    }

    #[test]
    fn search_errors_are_discovery_failures() {
        assert_eq!(OperationError::from(SearchError::InvalidResponse).kind, ErrorKind::Discovery);
        assert_eq!(OperationError::from(SearchError::Cancelled).kind, ErrorKind::Cancelled);
    }
}
