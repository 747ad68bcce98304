use std::net::IpAddr;

use crate::PortMappingProtocol;

/// Device types searched for, newest first.
pub const SEARCH_TARGETS: [&str; 2] = [
    "urn:schemas-upnp-org:device:InternetGatewayDevice:2",
    "urn:schemas-upnp-org:device:InternetGatewayDevice:1",
];

/// Connection services able to hold port mappings, in order of preference.
pub const WAN_SERVICE_TYPES: [&str; 3] = [
    "urn:schemas-upnp-org:service:WANIPConnection:2",
    "urn:schemas-upnp-org:service:WANIPConnection:1",
    "urn:schemas-upnp-org:service:WANPPPConnection:1",
];

pub const GET_EXTERNAL_IP_ACTION: &str = "GetExternalIPAddress";
pub const ADD_PORT_MAPPING_ACTION: &str = "AddPortMapping";
pub const DELETE_PORT_MAPPING_ACTION: &str = "DeletePortMapping";
pub const GET_GENERIC_PORT_MAPPING_ENTRY_ACTION: &str = "GetGenericPortMappingEntry";
pub const GET_LIST_OF_PORT_MAPPINGS_ACTION: &str = "GetListOfPortMappings";

pub fn format_search_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r
Host:239.255.255.250:1900\r
ST:{}\r
Man:\"ssdp:discover\"\r
MX:3\r\n\r\n",
        search_target
    )
}

/// Value of the `SOAPAction` header for `action` on `service_type`.
pub fn soap_action(service_type: &str, action: &str) -> String {
    format!("\"{}#{}\"", service_type, action)
}

fn envelope(service_type: &str, action: &str, arguments: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>
<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">
<s:Body>
    <u:{action} xmlns:u=\"{service}\">{arguments}
    </u:{action}>
</s:Body>
</s:Envelope>",
        action = action,
        service = service_type,
        arguments = arguments,
    )
}

pub fn format_get_external_ip_message(service_type: &str) -> String {
    envelope(service_type, GET_EXTERNAL_IP_ACTION, "")
}

pub fn format_add_port_mapping_message(
    service_type: &str,
    protocol: PortMappingProtocol,
    external_port: u16,
    internal_client: IpAddr,
    internal_port: u16,
    lease_duration: u32,
    description: &str,
) -> String {
    let arguments = format!(
        "
        <NewRemoteHost></NewRemoteHost>
        <NewExternalPort>{}</NewExternalPort>
        <NewProtocol>{}</NewProtocol>
        <NewInternalPort>{}</NewInternalPort>
        <NewInternalClient>{}</NewInternalClient>
        <NewEnabled>1</NewEnabled>
        <NewPortMappingDescription>{}</NewPortMappingDescription>
        <NewLeaseDuration>{}</NewLeaseDuration>",
        external_port, protocol, internal_port, internal_client, description, lease_duration,
    );
    envelope(service_type, ADD_PORT_MAPPING_ACTION, &arguments)
}

pub fn format_delete_port_message(service_type: &str, protocol: PortMappingProtocol, external_port: u16) -> String {
    let arguments = format!(
        "
        <NewRemoteHost></NewRemoteHost>
        <NewExternalPort>{}</NewExternalPort>
        <NewProtocol>{}</NewProtocol>",
        external_port, protocol,
    );
    envelope(service_type, DELETE_PORT_MAPPING_ACTION, &arguments)
}

pub fn format_get_generic_port_mapping_entry_message(service_type: &str, index: u32) -> String {
    let arguments = format!(
        "
        <NewPortMappingIndex>{}</NewPortMappingIndex>",
        index
    );
    envelope(service_type, GET_GENERIC_PORT_MAPPING_ENTRY_ACTION, &arguments)
}

pub fn format_get_list_of_port_mappings_message(
    service_type: &str,
    protocol: PortMappingProtocol,
    start_port: u16,
    end_port: u16,
    max_count: u32,
) -> String {
    let arguments = format!(
        "
        <NewStartPort>{}</NewStartPort>
        <NewEndPort>{}</NewEndPort>
        <NewProtocol>{}</NewProtocol>
        <NewManage>1</NewManage>
        <NewNumberOfPorts>{}</NewNumberOfPorts>",
        start_port, end_port, protocol, max_count,
    );
    envelope(service_type, GET_LIST_OF_PORT_MAPPINGS_ACTION, &arguments)
}

#[test]
fn test_soap_action_is_quoted() {
    assert_eq!(
        soap_action(WAN_SERVICE_TYPES[1], DELETE_PORT_MAPPING_ACTION),
        r#""urn:schemas-upnp-org:service:WANIPConnection:1#DeletePortMapping""#
    );
}

#[test]
fn test_messages_parse_as_xml() {
    let body = format_add_port_mapping_message(
        WAN_SERVICE_TYPES[0],
        PortMappingProtocol::UDP,
        7777,
        "192.168.1.3".parse().unwrap(),
        4000,
        60,
        "test",
    );
    let xml = xmltree::Element::parse(body.as_bytes()).unwrap();
    let action = xml.get_child("Body").and_then(|b| b.get_child("AddPortMapping")).unwrap();
    assert_eq!(action.get_child("NewExternalPort").and_then(|e| e.get_text()).unwrap(), "7777");
    assert_eq!(action.get_child("NewProtocol").and_then(|e| e.get_text()).unwrap(), "UDP");
    assert_eq!(action.get_child("NewInternalClient").and_then(|e| e.get_text()).unwrap(), "192.168.1.3");

    let body = format_get_external_ip_message(WAN_SERVICE_TYPES[1]);
    let xml = xmltree::Element::parse(body.as_bytes()).unwrap();
    assert!(xml.get_child("Body").and_then(|b| b.get_child(GET_EXTERNAL_IP_ACTION)).is_some());
}

#[test]
fn test_search_request_names_target() {
    let req = format_search_request(SEARCH_TARGETS[1]);
    assert!(req.starts_with("M-SEARCH * HTTP/1.1\r\n"));
    assert!(req.contains("ST:urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n"));
    assert!(req.ends_with("\r\n\r\n"));
}
