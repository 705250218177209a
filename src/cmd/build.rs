/*!
build.rs - request builder.

Maps `BoundArguments` to a typed `Request` for one operation kind.

Rules:
  - Pure and deterministic: no I/O, no clock, no randomness.
  - Names are copied verbatim (no trimming, no case folding).
  - Device lists split on ',' and drop empty items; an empty list is a
    valid request with zero devices.
  - Numbers and sizes are parsed here; failures are `BuildError`s.
  - Mutually exclusive flags are rejected here (`--raid` with `--no-raid`).
*/

use thiserror::Error;

use super::args::BoundArguments;
use super::catalog::OperationKind;
use super::request::*;

/// RAID type used when `array create` is given neither `--raid` nor `--no-raid`.
pub const DEFAULT_RAID: &str = "RAID5";
/// RAID type sent for `--no-raid`.
pub const NO_RAID: &str = "NONE";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("--{first} and --{second} cannot be used together")]
    Conflict {
        first: &'static str,
        second: &'static str,
    },

    #[error("invalid value '{value}' for --{param}: {reason}")]
    InvalidValue {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("request for {command} cannot be encoded: {reason}")]
    Encode {
        command: &'static str,
        reason: String,
    },
}

/* -------------------------------------------------------------------------- */
/* Entry point                                                                */
/* -------------------------------------------------------------------------- */

pub fn build(kind: OperationKind, args: &BoundArguments) -> Result<Request, BuildError> {
    let param = match kind {
        OperationKind::CreateArray => Param::CreateArray(create_array(args)?),
        OperationKind::DeleteArray => Param::DeleteArray(array_name(args)),
        OperationKind::MountArray => Param::MountArray(MountArrayParam {
            name: text(args, "array-name"),
            is_write_through_enabled: flag(args, "enable-write-through")?,
        }),
        OperationKind::UnmountArray => Param::UnmountArray(array_name(args)),
        OperationKind::AddSpare => Param::AddSpare(spare(args)),
        OperationKind::RemoveSpare => Param::RemoveSpare(spare(args)),
        OperationKind::ReplaceDevice => Param::ReplaceDevice(ReplaceDeviceParam {
            array: text(args, "array-name"),
            device: DeviceName::new(text(args, "device")),
        }),
        OperationKind::ArrayInfo => Param::ArrayInfo(array_name(args)),
        OperationKind::ListArray => Param::ListArray(Empty {}),
        OperationKind::CreateDevice => Param::CreateDevice(CreateDeviceParam {
            name: text(args, "device-name"),
            num_blocks: number(args, "num-blocks")?,
            block_size: number(args, "block-size")?,
            dev_type: text(args, "device-type"),
            numa: number(args, "numa")?,
        }),
        OperationKind::ScanDevice => Param::ScanDevice(Empty {}),
        OperationKind::ListDevice => Param::ListDevice(Empty {}),
        OperationKind::SmartLog => Param::SmartLog(DeviceParam {
            name: text(args, "device-name"),
        }),
        OperationKind::CreateVolume => Param::CreateVolume(CreateVolumeParam {
            name: text(args, "volume-name"),
            array: text(args, "array-name"),
            size: size(args, "size")?,
            maxiops: number(args, "maxiops")?,
            maxbw: number(args, "maxbw")?,
        }),
        OperationKind::DeleteVolume => Param::DeleteVolume(volume(args)),
        OperationKind::MountVolume => Param::MountVolume(MountVolumeParam {
            name: text(args, "volume-name"),
            array: text(args, "array-name"),
            subnqn: optional(args, "subnqn"),
        }),
        OperationKind::UnmountVolume => Param::UnmountVolume(volume(args)),
        OperationKind::RenameVolume => Param::RenameVolume(RenameVolumeParam {
            name: text(args, "volume-name"),
            array: text(args, "array-name"),
            new_name: text(args, "new-volume-name"),
        }),
        OperationKind::ListVolume => Param::ListVolume(ArrayRef {
            array: text(args, "array-name"),
        }),
        OperationKind::CreateSubsystem => Param::CreateSubsystem(CreateSubsystemParam {
            nqn: text(args, "subnqn"),
            serial_number: text(args, "serial-number"),
            model_number: text(args, "model-number"),
            max_namespaces: number(args, "max-namespaces")?,
            allow_any_host: flag(args, "allow-any-host")?,
            ana_reporting: flag(args, "ana-reporting")?,
        }),
        OperationKind::DeleteSubsystem => Param::DeleteSubsystem(SubsystemParam {
            subnqn: text(args, "subnqn"),
        }),
        OperationKind::AddListener => Param::AddListener(AddListenerParam {
            subnqn: text(args, "subnqn"),
            transport_type: text(args, "trtype"),
            target_address: text(args, "traddr"),
            transport_service_id: text(args, "trsvcid"),
        }),
        OperationKind::ListSubsystem => Param::ListSubsystem(Empty {}),
        OperationKind::SystemInfo => Param::SystemInfo(Empty {}),
        OperationKind::StopSystem => Param::StopSystem(Empty {}),
    };
    let request = Request::new(param);
    encodable(&request)?;
    Ok(request)
}

/* ---- Per-operation helpers ---- */

fn create_array(args: &BoundArguments) -> Result<CreateArrayParam, BuildError> {
    let no_raid = flag(args, "no-raid")?;
    let raidtype = match (optional(args, "raid"), no_raid) {
        (Some(_), true) => {
            return Err(BuildError::Conflict {
                first: "raid",
                second: "no-raid",
            });
        }
        (Some(raid), false) => raid,
        (None, true) => NO_RAID.to_string(),
        (None, false) => DEFAULT_RAID.to_string(),
    };
    Ok(CreateArrayParam {
        name: text(args, "array-name"),
        buffer: devices(args, "buffer"),
        data: devices(args, "data-devs"),
        spare: devices(args, "spare"),
        raidtype,
    })
}

fn array_name(args: &BoundArguments) -> ArrayName {
    ArrayName {
        name: text(args, "array-name"),
    }
}

fn spare(args: &BoundArguments) -> SpareParam {
    SpareParam {
        array: text(args, "array-name"),
        spare: devices(args, "spare"),
    }
}

fn volume(args: &BoundArguments) -> VolumeParam {
    VolumeParam {
        name: text(args, "volume-name"),
        array: text(args, "array-name"),
    }
}

/* -------------------------------------------------------------------------- */
/* Value coercion                                                             */
/* -------------------------------------------------------------------------- */

/// Verbatim value, or empty when absent.
fn text(args: &BoundArguments, name: &str) -> String {
    args.get(name).unwrap_or_default().to_string()
}

/// `None` when absent or empty.
/// A request that cannot be encoded is never handed to the transport.
fn encodable(request: &Request) -> Result<(), BuildError> {
    request
        .arguments()
        .map(|_| ())
        .map_err(|e| BuildError::Encode {
            command: request.command,
            reason: e.to_string(),
        })
}

fn optional(args: &BoundArguments, name: &str) -> Option<String> {
    args.get(name)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn devices(args: &BoundArguments, name: &str) -> Vec<DeviceName> {
    args.get(name)
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(DeviceName::new)
        .collect()
}

fn flag(args: &BoundArguments, name: &'static str) -> Result<bool, BuildError> {
    match args.get(name) {
        None => Ok(false),
        Some(raw) => parse_flag(raw).ok_or_else(|| BuildError::InvalidValue {
            param: name,
            value: raw.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn number<T>(args: &BoundArguments, name: &'static str) -> Result<T, BuildError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = args.get(name).unwrap_or_default();
    raw.parse::<T>().map_err(|e| BuildError::InvalidValue {
        param: name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn size(args: &BoundArguments, name: &'static str) -> Result<u64, BuildError> {
    let raw = args.get(name).unwrap_or_default();
    parse_size(raw).map_err(|reason| BuildError::InvalidValue {
        param: name,
        value: raw.to_string(),
        reason,
    })
}

/// Boolean spellings accepted for flags coming from batch files.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Parse a size such as `4096`, `512MB`, `10GiB` or `1t` into bytes.
/// All units are binary (1 KB = 1024 B).
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    if digits.is_empty() {
        return Err("expected a number followed by an optional unit".into());
    }
    let value: u64 = digits.parse().map_err(|e| format!("{e}"))?;
    let shift = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" | "KIB" => 10,
        "M" | "MB" | "MIB" => 20,
        "G" | "GB" | "GIB" => 30,
        "T" | "TB" | "TIB" => 40,
        "P" | "PB" | "PIB" => 50,
        other => return Err(format!("unknown unit '{other}'")),
    };
    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| "size overflows 64 bits".into())
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::catalog::{CATALOG, descriptor};
    use crate::cmd::validate::validate;

    fn bound(kind: OperationKind, pairs: &[(&str, &str)]) -> BoundArguments {
        BoundArguments::bind(descriptor(kind), pairs.iter().copied())
    }

    #[test]
    fn add_spare_single_device() {
        let args = bound(
            OperationKind::AddSpare,
            &[("array-name", "array0"), ("spare", "nvme5")],
        );
        let req = build(OperationKind::AddSpare, &args).unwrap();
        assert_eq!(req.command, "ADDDEVICE");
        assert_eq!(
            req.param,
            Param::AddSpare(SpareParam {
                array: "array0".into(),
                spare: vec![DeviceName::new("nvme5")],
            })
        );
    }

    #[test]
    fn empty_spare_yields_zero_devices() {
        let args = bound(
            OperationKind::AddSpare,
            &[("array-name", "array0"), ("spare", "")],
        );
        let req = build(OperationKind::AddSpare, &args).unwrap();
        match req.param {
            Param::AddSpare(p) => assert!(p.spare.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn separator_only_spare_list_yields_zero_devices() {
        for raw in [",", ",,"] {
            let args = bound(
                OperationKind::AddSpare,
                &[("array-name", "array0"), ("spare", raw)],
            );
            assert_eq!(validate(descriptor(OperationKind::AddSpare), &args), Ok(()));
            let req = build(OperationKind::AddSpare, &args).unwrap();
            assert_eq!(req.arguments().unwrap()["param"]["spare"], serde_json::json!([]));
        }
    }

    #[test]
    fn array_name_copied_verbatim() {
        let args = bound(
            OperationKind::AddSpare,
            &[("array-name", " Array0 "), ("spare", "nvme5")],
        );
        match build(OperationKind::AddSpare, &args).unwrap().param {
            Param::AddSpare(p) => assert_eq!(p.array, " Array0 "),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn create_array_raid_selection() {
        let base = [
            ("array-name", "array0"),
            ("buffer", "uram0"),
            ("data-devs", "nvme0,nvme1,nvme2"),
        ];
        let req = build(OperationKind::CreateArray, &bound(OperationKind::CreateArray, &base))
            .unwrap();
        match req.param {
            Param::CreateArray(p) => {
                assert_eq!(p.raidtype, DEFAULT_RAID);
                assert_eq!(p.data.len(), 3);
                assert!(p.spare.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut no_raid = base.to_vec();
        no_raid.push(("no-raid", "true"));
        match build(OperationKind::CreateArray, &bound(OperationKind::CreateArray, &no_raid))
            .unwrap()
            .param
        {
            Param::CreateArray(p) => assert_eq!(p.raidtype, NO_RAID),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raid_conflicts_with_no_raid() {
        let args = bound(
            OperationKind::CreateArray,
            &[
                ("array-name", "array0"),
                ("buffer", "uram0"),
                ("data-devs", "nvme0"),
                ("raid", "RAID10"),
                ("no-raid", "true"),
            ],
        );
        assert_eq!(
            build(OperationKind::CreateArray, &args),
            Err(BuildError::Conflict {
                first: "raid",
                second: "no-raid"
            })
        );
    }

    #[test]
    fn bad_number_is_a_build_error() {
        let args = bound(
            OperationKind::CreateDevice,
            &[("device-name", "uram0"), ("num-blocks", "lots")],
        );
        let err = build(OperationKind::CreateDevice, &args).unwrap_err();
        assert!(matches!(err, BuildError::InvalidValue { param: "num-blocks", .. }));
    }

    #[test]
    fn create_volume_parses_size() {
        let args = bound(
            OperationKind::CreateVolume,
            &[("volume-name", "vol1"), ("array-name", "array0"), ("size", "10GB")],
        );
        match build(OperationKind::CreateVolume, &args).unwrap().param {
            Param::CreateVolume(p) => {
                assert_eq!(p.size, 10 * 1024 * 1024 * 1024);
                assert_eq!((p.maxiops, p.maxbw), (0, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn size_units() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("1k"), Ok(1024));
        assert_eq!(parse_size("512MiB"), Ok(512 << 20));
        assert!(parse_size("GB").is_err());
        assert!(parse_size("10XB").is_err());
        assert!(parse_size("99999999PB").is_err());
    }

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn build_is_deterministic_for_every_kind() {
        for d in CATALOG {
            let pairs: Vec<(&str, &str)> = d
                .params
                .iter()
                .filter(|p| p.required)
                .map(|p| (p.name, if p.name == "size" || p.name == "num-blocks" { "8" } else { "x" }))
                .collect();
            let args = BoundArguments::bind(d, pairs);
            let first = build(d.kind, &args).unwrap();
            let second = build(d.kind, &args).unwrap();
            assert_eq!(first, second, "{}", d.path());
            assert_eq!(first.kind(), d.kind);
            assert_eq!(first.command, d.command);
        }
    }
}
