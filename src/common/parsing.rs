use std::borrow::Cow;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

use url::Url;
use xmltree::{Element, XMLNode};

use crate::common::messages::WAN_SERVICE_TYPES;
use crate::errors::{
    AddPortError, GetExternalIpError, GetGenericPortMappingEntryError, GetListOfPortMappingsError, RemovePortError,
    RequestError, SearchError,
};
use crate::mapping::{PortMappingEntry, PortMappingProtocol};

// Parse the result.
pub fn parse_search_result(text: &str) -> Result<(SocketAddrV4, String), SearchError> {
    use SearchError::InvalidResponse;

    for line in text.lines() {
        let line = line.trim();
        if line.to_ascii_lowercase().starts_with("location:") {
            if let Some(colon) = line.find(':') {
                let url_text = &line[colon + 1..].trim();
                let url = Url::parse(url_text).map_err(|_| InvalidResponse)?;
                let addr: Ipv4Addr = url
                    .host_str()
                    .ok_or(InvalidResponse)
                    .and_then(|s| s.parse().map_err(|_| InvalidResponse))?;
                let port: u16 = url.port_or_known_default().ok_or(InvalidResponse)?;

                return Ok((SocketAddrV4::new(addr, port), url.path().to_string()));
            }
        }
    }
    Err(InvalidResponse)
}

/// What the workflow needs from a root device description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: String,
    /// Path of the control endpoint of the connection service.
    pub control_url: String,
    /// Full URN of the connection service, which also selects the protocol generation.
    pub service_type: String,
}

pub fn parse_device_description<R>(resp: R) -> Result<DeviceDescription, SearchError>
where
    R: io::Read,
{
    let root = Element::parse(resp)?;

    let device = root.get_child("device").ok_or(SearchError::InvalidResponse)?;
    let friendly_name = device
        .get_child("friendlyName")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    for service_type in WAN_SERVICE_TYPES.iter() {
        if let Some(control_url) = scan_device(device, service_type) {
            return Ok(DeviceDescription {
                friendly_name,
                control_url: control_path(&control_url),
                service_type: service_type.to_string(),
            });
        }
    }

    Err(SearchError::InvalidResponse)
}

fn child_elements<'a>(element: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    element
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |e| e.name == name)
}

fn scan_device(device: &Element, service_type: &str) -> Option<String> {
    if let Some(service_list) = device.get_child("serviceList") {
        for service in child_elements(service_list, "service") {
            let found = service.get_child("serviceType").and_then(|e| e.get_text());
            if found.as_deref().map(str::trim) == Some(service_type) {
                if let Some(text) = service.get_child("controlURL").and_then(|e| e.get_text()) {
                    return Some(text.trim().to_string());
                }
            }
        }
    }

    let device_list = device.get_child("deviceList")?;
    child_elements(device_list, "device").find_map(|sub_device| scan_device(sub_device, service_type))
}

// Some devices advertise an absolute control URL.
fn control_path(control_url: &str) -> String {
    if let Ok(url) = Url::parse(control_url) {
        return match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
    }
    if control_url.starts_with('/') {
        control_url.to_string()
    } else {
        format!("/{}", control_url)
    }
}

pub struct RequestReponse {
    text: String,
    xml: Element,
}

pub type RequestResult = Result<RequestReponse, RequestError>;

pub fn parse_response(text: String, ok: &str) -> RequestResult {
    let mut xml = match Element::parse(text.as_bytes()) {
        Ok(xml) => xml,
        Err(..) => return Err(RequestError::InvalidResponse(text)),
    };
    let body = match xml.get_mut_child("Body") {
        Some(body) => body,
        None => return Err(RequestError::InvalidResponse(text)),
    };
    if let Some(ok) = body.take_child(ok) {
        return Ok(RequestReponse { text, xml: ok });
    }
    let upnp_error = match body
        .get_child("Fault")
        .and_then(|e| e.get_child("detail"))
        .and_then(|e| e.get_child("UPnPError"))
    {
        Some(upnp_error) => upnp_error,
        None => return Err(RequestError::InvalidResponse(text)),
    };

    match (
        upnp_error.get_child("errorCode").and_then(|e| e.get_text()),
        upnp_error.get_child("errorDescription").and_then(|e| e.get_text()),
    ) {
        (Some(et), dt) => match et.trim().parse::<u16>() {
            Ok(en) => Err(RequestError::ErrorCode(
                en,
                dt.map(|d| d.trim().to_string()).unwrap_or_default(),
            )),
            Err(..) => Err(RequestError::InvalidResponse(text)),
        },
        _ => Err(RequestError::InvalidResponse(text)),
    }
}

pub fn parse_get_external_ip_response(result: RequestResult) -> Result<IpAddr, GetExternalIpError> {
    match result {
        Ok(resp) => match resp
            .xml
            .get_child("NewExternalIPAddress")
            .and_then(|e| e.get_text())
            .and_then(|t| t.trim().parse::<IpAddr>().ok())
        {
            Some(addr) => Ok(addr),
            None => Err(GetExternalIpError::RequestError(RequestError::InvalidResponse(resp.text))),
        },
        Err(RequestError::ErrorCode(606, _)) => Err(GetExternalIpError::ActionNotAuthorized),
        Err(e) => Err(GetExternalIpError::RequestError(e)),
    }
}

pub fn convert_add_port_error(err: RequestError) -> AddPortError {
    match err {
        RequestError::ErrorCode(605, _) => AddPortError::DescriptionTooLong,
        RequestError::ErrorCode(606, _) => AddPortError::ActionNotAuthorized,
        RequestError::ErrorCode(718, _) => AddPortError::PortInUse,
        RequestError::ErrorCode(724, _) => AddPortError::SamePortValuesRequired,
        RequestError::ErrorCode(725, _) => AddPortError::OnlyPermanentLeasesSupported,
        e => AddPortError::RequestError(e),
    }
}

pub fn parse_delete_port_mapping_response(result: RequestResult) -> Result<(), RemovePortError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) => Err(match err {
            RequestError::ErrorCode(606, _) => RemovePortError::ActionNotAuthorized,
            RequestError::ErrorCode(714, _) => RemovePortError::NoSuchPortMapping,
            e => RemovePortError::RequestError(e),
        }),
    }
}

fn field<'a>(xml: &'a Element, name: &str) -> Result<Cow<'a, str>, String> {
    xml.get_child(name)
        .map(|e| e.get_text().unwrap_or(Cow::Borrowed("")))
        .ok_or_else(|| format!("{} is missing", name))
}

fn parse_field<T: FromStr>(xml: &Element, name: &str) -> Result<T, String> {
    field(xml, name)?
        .trim()
        .parse()
        .map_err(|_| format!("Field {} is invalid", name))
}

// The two protocol generations name the description and lease fields differently.
fn parse_entry(xml: &Element, description_field: &str, lease_field: &str) -> Result<PortMappingEntry, String> {
    Ok(PortMappingEntry {
        protocol: parse_field::<PortMappingProtocol>(xml, "NewProtocol")?,
        external_port: parse_field(xml, "NewExternalPort")?,
        internal_port: parse_field(xml, "NewInternalPort")?,
        internal_client: parse_field(xml, "NewInternalClient")?,
        lease_duration: Duration::from_secs(u64::from(parse_field::<u32>(xml, lease_field)?)),
        description: field(xml, description_field)?.trim().to_string(),
    })
}

pub fn parse_get_generic_port_mapping_entry(
    result: RequestResult,
) -> Result<PortMappingEntry, GetGenericPortMappingEntryError> {
    let response = result?;
    parse_entry(&response.xml, "NewPortMappingDescription", "NewLeaseDuration")
        .map_err(|msg| GetGenericPortMappingEntryError::RequestError(RequestError::InvalidResponse(msg)))
}

pub fn parse_get_list_of_port_mappings(
    result: RequestResult,
) -> Result<Vec<PortMappingEntry>, GetListOfPortMappingsError> {
    let resp = match result {
        Ok(resp) => resp,
        Err(RequestError::ErrorCode(401, _)) | Err(RequestError::ErrorCode(602, _)) => {
            return Err(GetListOfPortMappingsError::NotSupported)
        }
        Err(RequestError::ErrorCode(606, _)) => return Err(GetListOfPortMappingsError::ActionNotAuthorized),
        // PortMappingNotFound: nothing in the requested range.
        Err(RequestError::ErrorCode(730, _)) => return Ok(Vec::new()),
        Err(RequestError::ErrorCode(733, _)) => return Err(GetListOfPortMappingsError::InconsistentParameters),
        Err(e) => return Err(GetListOfPortMappingsError::RequestError(e)),
    };

    let invalid = |msg: String| GetListOfPortMappingsError::RequestError(RequestError::InvalidResponse(msg));
    let listing = resp
        .xml
        .get_child("NewPortListing")
        .and_then(|e| e.get_text())
        .ok_or_else(|| invalid(resp.text.clone()))?;
    if listing.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list = Element::parse(listing.trim().as_bytes()).map_err(|e| invalid(format!("NewPortListing is not XML: {}", e)))?;
    child_elements(&list, "PortMappingEntry")
        .map(|entry| parse_entry(entry, "NewDescription", "NewLeaseTime"))
        .collect::<Result<Vec<_>, String>>()
        .map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::errors::OperationError;

    fn soap(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>{}</s:Body>
</s:Envelope>"#,
            inner
        )
    }

    fn fault(code: u16, description: &str) -> String {
        soap(&format!(
            r#"<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError</faultstring>
<detail>
<UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
<errorCode>{}</errorCode>
<errorDescription>{}</errorDescription>
</UPnPError>
</detail>
</s:Fault>"#,
            code, description
        ))
    }

    #[test]
    fn test_parse_search_result_case_insensitivity() {
        assert!(parse_search_result("location:http://0.0.0.0:0/control_url").is_ok());
        assert!(parse_search_result("LOCATION:http://0.0.0.0:0/control_url").is_ok());
    }

    #[test]
    fn test_parse_search_result_ok() {
        let result = parse_search_result("location:http://0.0.0.0:0/control_url").unwrap();
        assert_eq!(result.0.ip(), &Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(result.0.port(), 0);
        assert_eq!(&result.1[..], "/control_url");
    }

    #[test]
    fn test_parse_search_result_fail() {
        assert!(parse_search_result("content-type:http://0.0.0.0:0/control_url").is_err());
    }

    #[test]
    fn test_parse_device1() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
   <specVersion>
      <major>1</major>
      <minor>0</minor>
   </specVersion>
   <device>
      <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
      <friendlyName>MiniUPnP router</friendlyName>
      <serviceList>
         <service>
            <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:Layer3Forwarding1</serviceId>
            <controlURL>/ctl/L3F</controlURL>
         </service>
      </serviceList>
      <deviceList>
         <device>
            <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
            <friendlyName>WANDevice</friendlyName>
            <serviceList>
               <service>
                  <serviceType>urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1</serviceType>
                  <controlURL>/ctl/CmnIfCfg</controlURL>
               </service>
            </serviceList>
            <deviceList>
               <device>
                  <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
                  <friendlyName>WANConnectionDevice</friendlyName>
                  <serviceList>
                     <service>
                        <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                        <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                        <controlURL>/ctl/IPConn</controlURL>
                     </service>
                  </serviceList>
               </device>
            </deviceList>
         </device>
      </deviceList>
      <presentationURL>http://192.168.0.1/</presentationURL>
   </device>
</root>"#;

        let description = parse_device_description(text.as_bytes()).unwrap();
        assert_eq!(description.control_url, "/ctl/IPConn");
        assert_eq!(description.friendly_name, "MiniUPnP router");
        assert_eq!(description.service_type, "urn:schemas-upnp-org:service:WANIPConnection:1");
    }

    #[test]
    fn test_parse_device2_prefers_newest_service() {
        let text = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
   <device>
      <friendlyName>IGD2</friendlyName>
      <deviceList>
         <device>
            <serviceList>
               <service>
                  <serviceType>urn:schemas-upnp-org:service:WANPPPConnection:1</serviceType>
                  <controlURL>/ppp</controlURL>
               </service>
               <service>
                  <serviceType>urn:schemas-upnp-org:service:WANIPConnection:2</serviceType>
                  <controlURL>http://192.168.0.1:5000/ipc2?x=1</controlURL>
               </service>
            </serviceList>
         </device>
      </deviceList>
   </device>
</root>"#;

        let description = parse_device_description(text.as_bytes()).unwrap();
        assert_eq!(description.service_type, "urn:schemas-upnp-org:service:WANIPConnection:2");
        assert_eq!(description.control_url, "/ipc2?x=1");
    }

    #[test]
    fn test_parse_device_without_connection_service() {
        let text = r#"<root><device><friendlyName>Printer</friendlyName></device></root>"#;
        assert!(parse_device_description(text.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_fault() {
        match parse_response(fault(714, "NoSuchEntryInArray"), "DeletePortMappingResponse") {
            Err(RequestError::ErrorCode(714, ref d)) => assert_eq!(d, "NoSuchEntryInArray"),
            _ => panic!("expected error code 714"),
        }
        let err = parse_delete_port_mapping_response(parse_response(fault(714, "NoSuchEntryInArray"), "x")).unwrap_err();
        assert_eq!(OperationError::from(err).kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_parse_external_ip() {
        let text = soap(
            r#"<u:GetExternalIPAddressResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
<NewExternalIPAddress>203.0.113.9</NewExternalIPAddress>
</u:GetExternalIPAddressResponse>"#,
        );
        let ip = parse_get_external_ip_response(parse_response(text, "GetExternalIPAddressResponse")).unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
    }

    #[test]
    fn test_parse_generic_entry() {
        let text = soap(
            r#"<u:GetGenericPortMappingEntryResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
<NewRemoteHost></NewRemoteHost>
<NewExternalPort>7777</NewExternalPort>
<NewProtocol>UDP</NewProtocol>
<NewInternalPort>4000</NewInternalPort>
<NewInternalClient>192.168.0.10</NewInternalClient>
<NewEnabled>1</NewEnabled>
<NewPortMappingDescription>test</NewPortMappingDescription>
<NewLeaseDuration>60</NewLeaseDuration>
</u:GetGenericPortMappingEntryResponse>"#,
        );
        let entry = parse_get_generic_port_mapping_entry(parse_response(text, "GetGenericPortMappingEntryResponse")).unwrap();
        assert_eq!(entry.protocol, PortMappingProtocol::UDP);
        assert_eq!(entry.external_port, 7777);
        assert_eq!(entry.internal_port, 4000);
        assert_eq!(entry.internal_client, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10)));
        assert_eq!(entry.lease_duration, Duration::from_secs(60));
        assert_eq!(entry.description, "test");
    }

    #[test]
    fn test_parse_generic_entry_past_the_end() {
        let result = parse_response(fault(713, "SpecifiedArrayIndexInvalid"), "GetGenericPortMappingEntryResponse");
        match parse_get_generic_port_mapping_entry(result) {
            Err(GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid) => {}
            _ => panic!("expected SpecifiedArrayIndexInvalid"),
        }
    }

    #[test]
    fn test_parse_list_of_port_mappings() {
        let text = soap(
            r#"<u:GetListOfPortMappingsResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:2">
<NewPortListing>&lt;?xml version="1.0" encoding="UTF-8"?&gt;
&lt;p:PortMappingList xmlns:p="urn:schemas-upnp-org:gw:WANIPConnection"&gt;
&lt;p:PortMappingEntry&gt;
&lt;p:NewRemoteHost&gt;&lt;/p:NewRemoteHost&gt;
&lt;p:NewExternalPort&gt;7777&lt;/p:NewExternalPort&gt;
&lt;p:NewProtocol&gt;UDP&lt;/p:NewProtocol&gt;
&lt;p:NewInternalPort&gt;4000&lt;/p:NewInternalPort&gt;
&lt;p:NewInternalClient&gt;192.168.0.10&lt;/p:NewInternalClient&gt;
&lt;p:NewEnabled&gt;1&lt;/p:NewEnabled&gt;
&lt;p:NewDescription&gt;test&lt;/p:NewDescription&gt;
&lt;p:NewLeaseTime&gt;0&lt;/p:NewLeaseTime&gt;
&lt;/p:PortMappingEntry&gt;
&lt;/p:PortMappingList&gt;</NewPortListing>
</u:GetListOfPortMappingsResponse>"#,
        );
        let entries = parse_get_list_of_port_mappings(parse_response(text, "GetListOfPortMappingsResponse")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].external_port, 7777);
        assert_eq!(entries[0].lease_duration, Duration::from_secs(0));
        assert_eq!(entries[0].description, "test");
    }

    #[test]
    fn test_parse_list_of_port_mappings_faults() {
        let empty = parse_response(fault(730, "PortMappingNotFound"), "GetListOfPortMappingsResponse");
        assert!(parse_get_list_of_port_mappings(empty).unwrap().is_empty());

        let unsupported = parse_response(fault(401, "Invalid Action"), "GetListOfPortMappingsResponse");
        match parse_get_list_of_port_mappings(unsupported) {
            Err(GetListOfPortMappingsError::NotSupported) => {}
            _ => panic!("expected NotSupported"),
        }
    }

    #[test]
    fn test_add_port_conflict() {
        match convert_add_port_error(RequestError::ErrorCode(718, "ConflictInMappingEntry".into())) {
            AddPortError::PortInUse => {}
            e => panic!("unexpected {}", e),
        }
    }
}
