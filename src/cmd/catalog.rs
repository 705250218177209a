/*!
Static command catalogue.

Every administrative operation the CLI knows about is described by one
`CommandDescriptor` in `CATALOG`. The command tree, the field validator,
the request builder and batch files all read from this table; nothing
mutates it at runtime.

Layout:
  Group          (array | device | volume | subsystem | system)
  OperationKind  (one variant per operation, e.g. AddSpare)
  ParamSpec      (name, short alias, required?, default, kind)

Helpers:
  - Group::variants() / Group::from_str_ci()
  - descriptor(kind)
  - find(group, name)
  - in_group(group)
*/

use std::fmt;

/* -------------------------------------------------------------------------- */
/* Groups                                                                     */
/* -------------------------------------------------------------------------- */

/// Top-level subject an operation acts on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Group {
    Array,
    Device,
    Volume,
    Subsystem,
    System,
}

impl Group {
    /// All groups in help display order.
    pub const fn variants() -> &'static [Group] {
        &[
            Group::Array,
            Group::Device,
            Group::Volume,
            Group::Subsystem,
            Group::System,
        ]
    }

    pub const fn name(self) -> &'static str {
        match self {
            Group::Array => "array",
            Group::Device => "device",
            Group::Volume => "volume",
            Group::Subsystem => "subsystem",
            Group::System => "system",
        }
    }

    pub const fn about(self) -> &'static str {
        match self {
            Group::Array => "Array lifecycle and spare device management",
            Group::Device => "Block device management",
            Group::Volume => "Volume lifecycle management",
            Group::Subsystem => "NVMe-oF subsystem management",
            Group::System => "Storage service control",
        }
    }

    /// Case-insensitive lookup used for batch files.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase();
        Group::variants()
            .iter()
            .copied()
            .find(|g| g.name() == norm)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/* -------------------------------------------------------------------------- */
/* Operation kinds                                                            */
/* -------------------------------------------------------------------------- */

/// One administrative intent with its own request schema.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OperationKind {
    CreateArray,
    DeleteArray,
    MountArray,
    UnmountArray,
    AddSpare,
    RemoveSpare,
    ReplaceDevice,
    ArrayInfo,
    ListArray,
    CreateDevice,
    ScanDevice,
    ListDevice,
    SmartLog,
    CreateVolume,
    DeleteVolume,
    MountVolume,
    UnmountVolume,
    RenameVolume,
    ListVolume,
    CreateSubsystem,
    DeleteSubsystem,
    AddListener,
    ListSubsystem,
    SystemInfo,
    StopSystem,
}

impl OperationKind {
    pub fn descriptor(self) -> &'static CommandDescriptor {
        descriptor(self)
    }

    /// Wire command name sent to the storage service.
    pub fn command(self) -> &'static str {
        self.descriptor().command
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor();
        write!(f, "{} {}", d.group, d.name)
    }
}

/* -------------------------------------------------------------------------- */
/* Descriptors                                                                */
/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamKind {
    /// Takes a value (`--array-name array0`).
    Text,
    /// Boolean switch (`--force`).
    Flag,
}

/// One named parameter of a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub short: Option<char>,
    pub required: bool,
    pub default: Option<&'static str>,
    pub kind: ParamKind,
    pub help: &'static str,
}

impl ParamSpec {
    const fn text(name: &'static str, help: &'static str) -> Self {
        ParamSpec {
            name,
            short: None,
            required: false,
            default: None,
            kind: ParamKind::Text,
            help,
        }
    }

    const fn flag(name: &'static str, help: &'static str) -> Self {
        ParamSpec {
            kind: ParamKind::Flag,
            ..ParamSpec::text(name, help)
        }
    }

    const fn short(self, c: char) -> Self {
        ParamSpec {
            short: Some(c),
            ..self
        }
    }

    const fn required(self) -> Self {
        ParamSpec {
            required: true,
            ..self
        }
    }

    const fn default(self, value: &'static str) -> Self {
        ParamSpec {
            default: Some(value),
            ..self
        }
    }
}

/// Static metadata for one operation.
#[derive(Debug)]
pub struct CommandDescriptor {
    pub kind: OperationKind,
    pub group: Group,
    /// Subcommand name under its group (`addspare`).
    pub name: &'static str,
    /// Wire command (`ADDDEVICE`).
    pub command: &'static str,
    pub about: &'static str,
    pub params: &'static [ParamSpec],
}

impl CommandDescriptor {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// `group name`, as typed on the command line.
    pub fn path(&self) -> String {
        format!("{} {}", self.group, self.name)
    }
}

/* ---- Shared parameter definitions ---- */

const ARRAY_NAME: ParamSpec = ParamSpec::text("array-name", "Name of the target array")
    .short('a')
    .required();
const VOLUME_NAME: ParamSpec = ParamSpec::text("volume-name", "Name of the target volume")
    .short('v')
    .required();
const SUBNQN: ParamSpec = ParamSpec::text("subnqn", "NVMe qualified name of the subsystem")
    .short('q')
    .required();

const NO_PARAMS: &[ParamSpec] = &[];

/* ---- The table ---- */

pub static CATALOG: &[CommandDescriptor] = &[
    /* array */
    CommandDescriptor {
        kind: OperationKind::CreateArray,
        group: Group::Array,
        name: "create",
        command: "CREATEARRAY",
        about: "Create an array from buffer, data and spare devices",
        params: &[
            ARRAY_NAME,
            ParamSpec::text("buffer", "Buffer (write cache) device names, comma separated")
                .short('b')
                .required(),
            ParamSpec::text("data-devs", "Data device names, comma separated")
                .short('d')
                .required(),
            ParamSpec::text("spare", "Spare device names, comma separated").short('s'),
            ParamSpec::text("raid", "RAID type of the array (RAID5 when omitted)").short('r'),
            ParamSpec::flag("no-raid", "Create the array without RAID protection"),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::DeleteArray,
        group: Group::Array,
        name: "delete",
        command: "DELETEARRAY",
        about: "Delete an unmounted array",
        params: &[ARRAY_NAME],
    },
    CommandDescriptor {
        kind: OperationKind::MountArray,
        group: Group::Array,
        name: "mount",
        command: "MOUNTARRAY",
        about: "Mount an array",
        params: &[
            ARRAY_NAME,
            ParamSpec::flag("enable-write-through", "Mount the array in write-through mode")
                .short('w'),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::UnmountArray,
        group: Group::Array,
        name: "unmount",
        command: "UNMOUNTARRAY",
        about: "Unmount an array",
        params: &[ARRAY_NAME],
    },
    CommandDescriptor {
        kind: OperationKind::AddSpare,
        group: Group::Array,
        name: "addspare",
        command: "ADDDEVICE",
        about: "Add a device as a spare to an existing array",
        params: &[
            ARRAY_NAME,
            ParamSpec::text("spare", "Device name(s) to add as spare, comma separated")
                .short('s')
                .required(),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::RemoveSpare,
        group: Group::Array,
        name: "rmspare",
        command: "REMOVEDEVICE",
        about: "Remove a spare device from an array",
        params: &[
            ARRAY_NAME,
            ParamSpec::text("spare", "Spare device name(s) to remove, comma separated")
                .short('s')
                .required(),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::ReplaceDevice,
        group: Group::Array,
        name: "replace",
        command: "REPLACEDEVICE",
        about: "Replace a data device with an available spare",
        params: &[
            ARRAY_NAME,
            ParamSpec::text("device", "Data device to replace")
                .short('d')
                .required(),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::ArrayInfo,
        group: Group::Array,
        name: "info",
        command: "ARRAYINFO",
        about: "Show detailed information about one array",
        params: &[ARRAY_NAME],
    },
    CommandDescriptor {
        kind: OperationKind::ListArray,
        group: Group::Array,
        name: "list",
        command: "LISTARRAY",
        about: "List all arrays",
        params: NO_PARAMS,
    },
    /* device */
    CommandDescriptor {
        kind: OperationKind::CreateDevice,
        group: Group::Device,
        name: "create",
        command: "CREATEDEVICE",
        about: "Create a memory-backed buffer device",
        params: &[
            ParamSpec::text("device-name", "Name of the device to create")
                .short('d')
                .required(),
            ParamSpec::text("num-blocks", "Number of blocks")
                .short('b')
                .required(),
            ParamSpec::text("block-size", "Block size in bytes")
                .short('s')
                .default("512"),
            ParamSpec::text("device-type", "Device type")
                .short('t')
                .default("uram"),
            ParamSpec::text("numa", "NUMA node the device is allocated on")
                .short('n')
                .default("0"),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::ScanDevice,
        group: Group::Device,
        name: "scan",
        command: "SCANDEVICE",
        about: "Rescan attached devices",
        params: NO_PARAMS,
    },
    CommandDescriptor {
        kind: OperationKind::ListDevice,
        group: Group::Device,
        name: "list",
        command: "LISTDEVICE",
        about: "List devices known to the storage service",
        params: NO_PARAMS,
    },
    CommandDescriptor {
        kind: OperationKind::SmartLog,
        group: Group::Device,
        name: "smart-log",
        command: "SMARTLOG",
        about: "Show the SMART log of an NVMe device",
        params: &[ParamSpec::text("device-name", "Name of the device")
            .short('d')
            .required()],
    },
    /* volume */
    CommandDescriptor {
        kind: OperationKind::CreateVolume,
        group: Group::Volume,
        name: "create",
        command: "CREATEVOLUME",
        about: "Create a volume in an array",
        params: &[
            VOLUME_NAME,
            ARRAY_NAME,
            ParamSpec::text("size", "Volume size (e.g. 10GB, 512MiB, 4096)").required(),
            ParamSpec::text("maxiops", "Maximum IOPS in KIOPS (0 = unlimited)").default("0"),
            ParamSpec::text("maxbw", "Maximum bandwidth in MiB/s (0 = unlimited)").default("0"),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::DeleteVolume,
        group: Group::Volume,
        name: "delete",
        command: "DELETEVOLUME",
        about: "Delete a volume",
        params: &[VOLUME_NAME, ARRAY_NAME],
    },
    CommandDescriptor {
        kind: OperationKind::MountVolume,
        group: Group::Volume,
        name: "mount",
        command: "MOUNTVOLUME",
        about: "Mount a volume, optionally to a specific subsystem",
        params: &[
            VOLUME_NAME,
            ARRAY_NAME,
            ParamSpec::text("subnqn", "Subsystem to expose the volume through").short('q'),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::UnmountVolume,
        group: Group::Volume,
        name: "unmount",
        command: "UNMOUNTVOLUME",
        about: "Unmount a volume",
        params: &[VOLUME_NAME, ARRAY_NAME],
    },
    CommandDescriptor {
        kind: OperationKind::RenameVolume,
        group: Group::Volume,
        name: "rename",
        command: "RENAMEVOLUME",
        about: "Rename a volume",
        params: &[
            VOLUME_NAME,
            ARRAY_NAME,
            ParamSpec::text("new-volume-name", "New name of the volume")
                .short('n')
                .required(),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::ListVolume,
        group: Group::Volume,
        name: "list",
        command: "LISTVOLUME",
        about: "List the volumes of an array",
        params: &[ARRAY_NAME],
    },
    /* subsystem */
    CommandDescriptor {
        kind: OperationKind::CreateSubsystem,
        group: Group::Subsystem,
        name: "create",
        command: "CREATESUBSYSTEM",
        about: "Create an NVMe-oF subsystem",
        params: &[
            SUBNQN,
            ParamSpec::text("serial-number", "Serial number reported to hosts")
                .default("POS00000000000000"),
            ParamSpec::text("model-number", "Model number reported to hosts")
                .default("POS_VOLUME_EXTENSION"),
            ParamSpec::text("max-namespaces", "Maximum number of namespaces").default("256"),
            ParamSpec::flag("allow-any-host", "Allow any host to connect").short('o'),
            ParamSpec::flag("ana-reporting", "Enable ANA reporting"),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::DeleteSubsystem,
        group: Group::Subsystem,
        name: "delete",
        command: "DELETESUBSYSTEM",
        about: "Delete an NVMe-oF subsystem",
        params: &[SUBNQN],
    },
    CommandDescriptor {
        kind: OperationKind::AddListener,
        group: Group::Subsystem,
        name: "add-listener",
        command: "ADDLISTENER",
        about: "Add a transport listener to a subsystem",
        params: &[
            SUBNQN,
            ParamSpec::text("trtype", "Transport type (tcp, rdma)")
                .short('t')
                .required(),
            ParamSpec::text("traddr", "Transport address")
                .short('i')
                .required(),
            ParamSpec::text("trsvcid", "Transport service id (port)")
                .short('p')
                .required(),
        ],
    },
    CommandDescriptor {
        kind: OperationKind::ListSubsystem,
        group: Group::Subsystem,
        name: "list",
        command: "LISTSUBSYSTEM",
        about: "List NVMe-oF subsystems",
        params: NO_PARAMS,
    },
    /* system */
    CommandDescriptor {
        kind: OperationKind::SystemInfo,
        group: Group::System,
        name: "info",
        command: "SYSTEMINFO",
        about: "Show storage service version and status",
        params: NO_PARAMS,
    },
    CommandDescriptor {
        kind: OperationKind::StopSystem,
        group: Group::System,
        name: "stop",
        command: "STOPSYSTEM",
        about: "Stop the storage service",
        params: NO_PARAMS,
    },
];

/* -------------------------------------------------------------------------- */
/* Lookups                                                                    */
/* -------------------------------------------------------------------------- */

/// Descriptor of an operation kind. `CATALOG` is ordered like `OperationKind`.
pub fn descriptor(kind: OperationKind) -> &'static CommandDescriptor {
    &CATALOG[kind as usize]
}

/// Find an operation by group and subcommand name.
pub fn find(group: Group, name: &str) -> Option<&'static CommandDescriptor> {
    CATALOG
        .iter()
        .find(|d| d.group == group && d.name == name)
}

pub fn in_group(group: Group) -> impl Iterator<Item = &'static CommandDescriptor> {
    CATALOG.iter().filter(move |d| d.group == group)
}

/* --------------------------------- Tests ---------------------------------- */
