//! Domain requests sent to the storage-management service.
//!
//! A `Request` is the envelope (`command`, `requestor`, `param`); `Param`
//! carries one typed struct per operation kind. Serialization emits every
//! declared field (`null`, `[]` and `false` included) so a rendered trace
//! shows exactly what went on the wire.

use serde::Serialize;
use serde_json::{Map, Value};

use super::catalog::OperationKind;

/// Identifies this client in the request envelope.
pub const REQUESTOR: &str = "cli";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub command: &'static str,
    pub requestor: &'static str,
    pub param: Param,
}

impl Request {
    pub fn new(param: Param) -> Self {
        Request {
            command: param.kind().command(),
            requestor: REQUESTOR,
            param,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.param.kind()
    }

    /// The envelope as a JSON object, as sent for a tool call.
    pub fn arguments(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

/// Operation-specific parameters. Serialized without a tag: the envelope's
/// `command` already names the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    CreateArray(CreateArrayParam),
    DeleteArray(ArrayName),
    MountArray(MountArrayParam),
    UnmountArray(ArrayName),
    AddSpare(SpareParam),
    RemoveSpare(SpareParam),
    ReplaceDevice(ReplaceDeviceParam),
    ArrayInfo(ArrayName),
    ListArray(Empty),
    CreateDevice(CreateDeviceParam),
    ScanDevice(Empty),
    ListDevice(Empty),
    SmartLog(DeviceParam),
    CreateVolume(CreateVolumeParam),
    DeleteVolume(VolumeParam),
    MountVolume(MountVolumeParam),
    UnmountVolume(VolumeParam),
    RenameVolume(RenameVolumeParam),
    ListVolume(ArrayRef),
    CreateSubsystem(CreateSubsystemParam),
    DeleteSubsystem(SubsystemParam),
    AddListener(AddListenerParam),
    ListSubsystem(Empty),
    SystemInfo(Empty),
    StopSystem(Empty),
}

impl Param {
    pub fn kind(&self) -> OperationKind {
        match self {
            Param::CreateArray(_) => OperationKind::CreateArray,
            Param::DeleteArray(_) => OperationKind::DeleteArray,
            Param::MountArray(_) => OperationKind::MountArray,
            Param::UnmountArray(_) => OperationKind::UnmountArray,
            Param::AddSpare(_) => OperationKind::AddSpare,
            Param::RemoveSpare(_) => OperationKind::RemoveSpare,
            Param::ReplaceDevice(_) => OperationKind::ReplaceDevice,
            Param::ArrayInfo(_) => OperationKind::ArrayInfo,
            Param::ListArray(_) => OperationKind::ListArray,
            Param::CreateDevice(_) => OperationKind::CreateDevice,
            Param::ScanDevice(_) => OperationKind::ScanDevice,
            Param::ListDevice(_) => OperationKind::ListDevice,
            Param::SmartLog(_) => OperationKind::SmartLog,
            Param::CreateVolume(_) => OperationKind::CreateVolume,
            Param::DeleteVolume(_) => OperationKind::DeleteVolume,
            Param::MountVolume(_) => OperationKind::MountVolume,
            Param::UnmountVolume(_) => OperationKind::UnmountVolume,
            Param::RenameVolume(_) => OperationKind::RenameVolume,
            Param::ListVolume(_) => OperationKind::ListVolume,
            Param::CreateSubsystem(_) => OperationKind::CreateSubsystem,
            Param::DeleteSubsystem(_) => OperationKind::DeleteSubsystem,
            Param::AddListener(_) => OperationKind::AddListener,
            Param::ListSubsystem(_) => OperationKind::ListSubsystem,
            Param::SystemInfo(_) => OperationKind::SystemInfo,
            Param::StopSystem(_) => OperationKind::StopSystem,
        }
    }
}

/* ---- Shared pieces ---- */

/// Operations without parameters still send an (empty) object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceName {
    pub device_name: String,
}

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Self {
        DeviceName {
            device_name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayRef {
    pub array: String,
}

/* ---- Array ---- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArrayParam {
    pub name: String,
    pub buffer: Vec<DeviceName>,
    pub data: Vec<DeviceName>,
    pub spare: Vec<DeviceName>,
    pub raidtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountArrayParam {
    pub name: String,
    pub is_write_through_enabled: bool,
}

/// Shared by add-spare and remove-spare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpareParam {
    pub array: String,
    pub spare: Vec<DeviceName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceDeviceParam {
    pub array: String,
    pub device: DeviceName,
}

/* ---- Device ---- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceParam {
    pub name: String,
    pub num_blocks: u32,
    pub block_size: u32,
    pub dev_type: String,
    pub numa: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceParam {
    pub name: String,
}

/* ---- Volume ---- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeParam {
    pub name: String,
    pub array: String,
    pub size: u64,
    pub maxiops: u64,
    pub maxbw: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeParam {
    pub name: String,
    pub array: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountVolumeParam {
    pub name: String,
    pub array: String,
    pub subnqn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameVolumeParam {
    pub name: String,
    pub array: String,
    pub new_name: String,
}

/* ---- Subsystem ---- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubsystemParam {
    pub nqn: String,
    pub serial_number: String,
    pub model_number: String,
    pub max_namespaces: u32,
    pub allow_any_host: bool,
    pub ana_reporting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemParam {
    pub subnqn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddListenerParam {
    pub subnqn: String,
    pub transport_type: String,
    pub target_address: String,
    pub transport_service_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_are_the_envelope_object() {
        let req = Request::new(Param::ListVolume(ArrayRef {
            array: "array0".into(),
        }));
        let args = req.arguments().unwrap();
        assert_eq!(Value::Object(args), serde_json::to_value(&req).unwrap());
    }

    #[test]
    fn envelope_names_the_wire_command() {
        let req = Request::new(Param::AddSpare(SpareParam {
            array: "array0".into(),
            spare: vec![DeviceName::new("nvme5")],
        }));
        assert_eq!(req.command, "ADDDEVICE");
        assert_eq!(req.kind(), OperationKind::AddSpare);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "command": "ADDDEVICE",
                "requestor": "cli",
                "param": {"array": "array0", "spare": [{"deviceName": "nvme5"}]}
            })
        );
    }

    #[test]
    fn unpopulated_fields_are_emitted() {
        let req = Request::new(Param::MountVolume(MountVolumeParam {
            name: "vol1".into(),
            array: "array0".into(),
            subnqn: None,
        }));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["param"]["subnqn"], serde_json::Value::Null);
        assert!(v["param"].as_object().unwrap().contains_key("subnqn"));

        let empty = Request::new(Param::AddSpare(SpareParam {
            array: "array0".into(),
            spare: vec![],
        }));
        assert_eq!(serde_json::to_value(&empty).unwrap()["param"]["spare"], json!([]));
    }

    #[test]
    fn parameterless_operations_send_an_object() {
        let req = Request::new(Param::ListArray(Empty {}));
        assert_eq!(serde_json::to_value(&req).unwrap()["param"], json!({}));
    }
}
