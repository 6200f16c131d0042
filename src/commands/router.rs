//! Command parsing and routing for vmrelay.
//!
//! Parses command lines into structured commands that can be dispatched to
//! handlers. Verbs, sub-verbs and keys are case-sensitive.

use super::tokenizer::{tokenize, CommandQueue};

/// Fallback for `set cpuCount` when the count does not parse.
pub const DEFAULT_CPU_COUNT: u32 = 1;

/// Fallback for `set ramSize` (MiB) when the size does not parse.
pub const DEFAULT_RAM_MIB: u32 = 512;

/// Sub-verbs of `control`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Launch the selected VM.
    Start,
    /// Press the selected VM's power button.
    Stop,
    /// Export the selected VM; `None` when no path was given.
    Output(Option<String>),
    /// Unrecognized or missing sub-verb.
    Unknown(Option<String>),
}

/// Keys accepted by `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetKey {
    BackendVersion,
    Backend,
    ImportStat,
    ImportProgress,
    ImportedNewName,
    ImportSucceeded,
    IpconfigAndSave,
    UserHomePath,
    SystemTotalRam,
    VmxSupport,
    ProcessorCount,
    MachineState,
    MachineId,
    MachineName,
    PowerStat,
    PowerSucceeded,
    PowerError,
}

impl GetKey {
    /// Every key, global ones first.
    pub const ALL: [GetKey; 17] = [
        Self::BackendVersion,
        Self::Backend,
        Self::ImportStat,
        Self::ImportProgress,
        Self::ImportedNewName,
        Self::ImportSucceeded,
        Self::IpconfigAndSave,
        Self::UserHomePath,
        Self::SystemTotalRam,
        Self::VmxSupport,
        Self::ProcessorCount,
        Self::MachineState,
        Self::MachineId,
        Self::MachineName,
        Self::PowerStat,
        Self::PowerSucceeded,
        Self::PowerError,
    ];

    /// Parses a protocol key.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Returns the protocol spelling of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendVersion => "backendVersion",
            Self::Backend => "backend",
            Self::ImportStat => "importStat",
            Self::ImportProgress => "importProgress",
            Self::ImportedNewName => "importedNewName",
            Self::ImportSucceeded => "importSucceeded",
            Self::IpconfigAndSave => "ipconfigAndSave",
            Self::UserHomePath => "userHomePath",
            Self::SystemTotalRam => "systemTotalRAM",
            Self::VmxSupport => "vmxSupport",
            Self::ProcessorCount => "processorCount",
            Self::MachineState => "machineState",
            Self::MachineId => "machineId",
            Self::MachineName => "machineName",
            Self::PowerStat => "powerStat",
            Self::PowerSucceeded => "powerSucceeded",
            Self::PowerError => "powerError",
        }
    }

    /// Returns true if the key is only answerable with a selected VM.
    pub fn needs_selection(&self) -> bool {
        matches!(
            self,
            Self::MachineState
                | Self::MachineId
                | Self::MachineName
                | Self::PowerStat
                | Self::PowerSucceeded
                | Self::PowerError
        )
    }
}

/// Sub-verbs of `set`, with their arguments already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetCommand {
    /// Rename the selected VM.
    MachineName(String),
    /// Set the CPU count (unparseable input already replaced by the fallback).
    CpuCount(u32),
    /// Set the memory size in MiB (unparseable input already replaced).
    RamSize(u32),
    /// Add a NAT rule.
    AddPortForwarding { guest_port: u16, host_port: u16 },
    /// Remove the NAT rule for a guest port.
    RemovePortForwarding { guest_port: u16 },
    /// A required argument is missing.
    Missing(&'static str),
    /// An argument did not parse.
    Invalid(&'static str),
    /// Unrecognized or missing sub-verb.
    Unknown(Option<String>),
}

/// Parsed command with arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `select search <query>`; `None` when no query was given.
    Select { query: Option<String> },
    /// `control <sub-verb>`.
    Control(ControlCommand),
    /// `get <key>`; `None` for an unrecognized or missing key.
    Get(Option<GetKey>),
    /// `set <sub-verb> <args...>`.
    Set(SetCommand),
    /// `import <locator...>`.
    Import { locator: Option<String> },
    /// `del <nameOrUuid>`.
    Delete { target: Option<String> },
    /// `exit`.
    Exit,
    /// `keepAlive`.
    KeepAlive,
    /// Unknown verb (empty for a blank line).
    Unknown(String),
}

impl Command {
    /// Returns the verb for logging.
    pub fn verb(&self) -> &str {
        match self {
            Self::Select { .. } => "select",
            Self::Control(_) => "control",
            Self::Get(_) => "get",
            Self::Set(_) => "set",
            Self::Import { .. } => "import",
            Self::Delete { .. } => "del",
            Self::Exit => "exit",
            Self::KeepAlive => "keepAlive",
            Self::Unknown(verb) => verb,
        }
    }
}

/// Command router for parsing command lines.
pub struct CommandRouter;

impl CommandRouter {
    /// Parse a command line into a Command.
    pub fn parse(input: &str) -> Command {
        Self::parse_queue(tokenize(input))
    }

    /// Parse an already tokenized command line.
    pub fn parse_queue(mut queue: CommandQueue) -> Command {
        let Some(verb) = queue.pop() else {
            return Command::Unknown(String::new());
        };

        match verb.as_str() {
            "select" => Self::parse_select(&mut queue),
            "control" => Command::Control(Self::parse_control(&mut queue)),
            "get" => Command::Get(queue.pop().as_deref().and_then(GetKey::parse)),
            "set" => Command::Set(Self::parse_set(&mut queue)),
            "import" => Command::Import {
                locator: queue.rest_joined(),
            },
            "del" => Command::Delete {
                target: queue.pop(),
            },
            "exit" => Command::Exit,
            "keepAlive" => Command::KeepAlive,
            _ => Command::Unknown(verb),
        }
    }

    /// Parse `select` sub-verbs. Only `search` exists.
    fn parse_select(queue: &mut CommandQueue) -> Command {
        match queue.pop().as_deref() {
            Some("search") => Command::Select { query: queue.pop() },
            _ => Command::Unknown("select".to_string()),
        }
    }

    /// Parse `control` sub-verbs.
    fn parse_control(queue: &mut CommandQueue) -> ControlCommand {
        let Some(sub) = queue.pop() else {
            return ControlCommand::Unknown(None);
        };
        match sub.as_str() {
            "start" => ControlCommand::Start,
            "stop" => ControlCommand::Stop,
            "output" => ControlCommand::Output(queue.pop()),
            _ => ControlCommand::Unknown(Some(sub)),
        }
    }

    /// Parse `set` sub-verbs.
    fn parse_set(queue: &mut CommandQueue) -> SetCommand {
        let Some(sub) = queue.pop() else {
            return SetCommand::Unknown(None);
        };
        match sub.as_str() {
            "machineName" => match queue.rest_joined() {
                Some(name) => SetCommand::MachineName(name),
                None => SetCommand::Missing("name"),
            },
            "cpuCount" => SetCommand::CpuCount(parse_or(queue.pop(), DEFAULT_CPU_COUNT)),
            "ramSize" => SetCommand::RamSize(parse_or(queue.pop(), DEFAULT_RAM_MIB)),
            "addPortForwarding" => {
                let guest_port = match parse_port(queue.pop(), "guestPort") {
                    Ok(port) => port,
                    Err(cmd) => return cmd,
                };
                let host_port = match parse_port(queue.pop(), "hostPort") {
                    Ok(port) => port,
                    Err(cmd) => return cmd,
                };
                SetCommand::AddPortForwarding {
                    guest_port,
                    host_port,
                }
            }
            "removePortForwarding" => match parse_port(queue.pop(), "guestPort") {
                Ok(guest_port) => SetCommand::RemovePortForwarding { guest_port },
                Err(cmd) => cmd,
            },
            _ => SetCommand::Unknown(Some(sub)),
        }
    }
}

/// Parses a count, substituting `fallback` for missing or unparseable input.
fn parse_or(token: Option<String>, fallback: u32) -> u32 {
    token
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Parses a TCP port argument named `name`.
fn parse_port(token: Option<String>, name: &'static str) -> Result<u16, SetCommand> {
    let token = token.ok_or(SetCommand::Missing(name))?;
    token
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or(SetCommand::Invalid(name))
}
