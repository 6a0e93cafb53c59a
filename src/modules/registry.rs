//! Module registry: the shared mode, action and command tables.
//!
//! Registration validates everything a module declares before touching any
//! table, so a rejected module leaves the registry exactly as it was.

use super::actions::ActionFn;
use super::traits::{CommandHandler, ModeHandler, Module};
use crate::error::RegistryError;
use crate::modes::ModeScope;
use meshirc_proto::{CHANNEL_NAME_MAX, ModeType, is_valid_mode_letter};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// An installed mode letter.
#[derive(Clone)]
pub struct ModeEntry {
    pub letter: char,
    pub mode_type: ModeType,
    pub handler: Rc<dyn ModeHandler>,
    pub module: String,
}

/// An installed status mode, kept in descending rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub letter: char,
    pub symbol: char,
    pub rank: i32,
}

/// A mode hooked into an action as a conditional handler.
#[derive(Clone)]
pub struct ModeHook {
    pub scope: ModeScope,
    pub letter: char,
    pub handler: Rc<dyn ModeHandler>,
}

#[derive(Clone)]
struct Prioritized<T> {
    priority: i32,
    module: String,
    item: T,
}

/// Insert keeping descending priority; ties land after existing entries.
fn insert_sorted<T>(list: &mut Vec<Prioritized<T>>, entry: Prioritized<T>) {
    let pos = list
        .iter()
        .position(|e| e.priority < entry.priority)
        .unwrap_or(list.len());
    list.insert(pos, entry);
}

struct LoadedModule {
    module: Rc<dyn Module>,
    common: bool,
}

#[derive(Default)]
pub struct Registry {
    modules: BTreeMap<String, LoadedModule>,
    load_order: Vec<String>,
    channel_modes: BTreeMap<ModeType, BTreeMap<char, ModeEntry>>,
    channel_statuses: Vec<StatusEntry>,
    user_modes: BTreeMap<ModeType, BTreeMap<char, ModeEntry>>,
    actions: HashMap<String, Vec<Prioritized<ActionFn>>>,
    mode_hooks: HashMap<String, Vec<Prioritized<ModeHook>>>,
    user_commands: HashMap<String, Vec<Prioritized<Rc<dyn CommandHandler>>>>,
    server_commands: HashMap<String, Vec<Prioritized<Rc<dyn CommandHandler>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and install a module's declarations.
    pub fn register(&mut self, module: Rc<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        if self.modules.contains_key(&name) {
            return Err(RegistryError::AlreadyLoaded(name));
        }

        let channel_modes = module.channel_modes();
        let user_modes = module.user_modes();
        let actions = module.actions();
        let user_commands = module.user_commands();
        let server_commands = module.server_commands();

        // Validation: no table is touched until everything passed.
        let mut seen_channel: HashMap<char, String> = HashMap::new();
        let mut seen_symbols: HashMap<char, char> = self
            .channel_statuses
            .iter()
            .map(|s| (s.symbol, s.letter))
            .collect();
        for spec in &channel_modes {
            if !is_valid_mode_letter(spec.letter) {
                return Err(RegistryError::InvalidModeLetter {
                    module: name,
                    letter: spec.letter,
                });
            }
            let owner = self
                .channel_mode(spec.letter)
                .map(|e| e.module.clone())
                .or_else(|| seen_channel.get(&spec.letter).cloned());
            if let Some(owner) = owner {
                return Err(RegistryError::ModeConflict {
                    module: name,
                    scope: "channel",
                    letter: spec.letter,
                    owner,
                });
            }
            seen_channel.insert(spec.letter, name.clone());
            if spec.mode_type == ModeType::Status {
                let Some(status) = spec.status else {
                    return Err(RegistryError::StatusMissingRank {
                        module: name,
                        letter: spec.letter,
                    });
                };
                if !status.symbol.is_ascii_punctuation() {
                    return Err(RegistryError::InvalidStatusSymbol {
                        module: name,
                        letter: spec.letter,
                        symbol: status.symbol,
                    });
                }
                if let Some(existing) = seen_symbols.get(&status.symbol) {
                    return Err(RegistryError::StatusSymbolConflict {
                        module: name,
                        symbol: status.symbol,
                        existing: *existing,
                    });
                }
                seen_symbols.insert(status.symbol, spec.letter);
            }
        }

        let mut seen_user: HashMap<char, String> = HashMap::new();
        for spec in &user_modes {
            if !is_valid_mode_letter(spec.letter) {
                return Err(RegistryError::InvalidModeLetter {
                    module: name,
                    letter: spec.letter,
                });
            }
            if spec.mode_type == ModeType::Status {
                return Err(RegistryError::UserStatusMode {
                    module: name,
                    letter: spec.letter,
                });
            }
            let owner = self
                .user_mode(spec.letter)
                .map(|e| e.module.clone())
                .or_else(|| seen_user.get(&spec.letter).cloned());
            if let Some(owner) = owner {
                return Err(RegistryError::ModeConflict {
                    module: name,
                    scope: "user",
                    letter: spec.letter,
                    owner,
                });
            }
            seen_user.insert(spec.letter, name.clone());
        }

        for command in user_commands.iter().chain(server_commands.iter()) {
            let valid = !command.name.is_empty()
                && command.name.chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(RegistryError::InvalidCommandName {
                    module: name,
                    command: command.name.clone(),
                });
            }
        }

        // Installation.
        for spec in &channel_modes {
            if let (ModeType::Status, Some(status)) = (spec.mode_type, spec.status) {
                let entry = StatusEntry {
                    letter: spec.letter,
                    symbol: status.symbol,
                    rank: status.rank,
                };
                let pos = self
                    .channel_statuses
                    .iter()
                    .position(|s| s.rank < status.rank)
                    .unwrap_or(self.channel_statuses.len());
                self.channel_statuses.insert(pos, entry);
            }
            self.channel_modes.entry(spec.mode_type).or_default().insert(
                spec.letter,
                ModeEntry {
                    letter: spec.letter,
                    mode_type: spec.mode_type,
                    handler: Rc::clone(&spec.handler),
                    module: name.clone(),
                },
            );
            self.install_hooks(&name, ModeScope::Channel, spec.letter, &spec.handler);
        }
        for spec in &user_modes {
            self.user_modes.entry(spec.mode_type).or_default().insert(
                spec.letter,
                ModeEntry {
                    letter: spec.letter,
                    mode_type: spec.mode_type,
                    handler: Rc::clone(&spec.handler),
                    module: name.clone(),
                },
            );
            self.install_hooks(&name, ModeScope::User, spec.letter, &spec.handler);
        }
        for action in actions {
            insert_sorted(
                self.actions.entry(action.name).or_default(),
                Prioritized {
                    priority: action.priority,
                    module: name.clone(),
                    item: action.handler,
                },
            );
        }
        for command in user_commands {
            insert_sorted(
                self.user_commands
                    .entry(command.name.to_ascii_uppercase())
                    .or_default(),
                Prioritized {
                    priority: command.priority,
                    module: name.clone(),
                    item: command.handler,
                },
            );
        }
        let declares_server_commands = !server_commands.is_empty();
        for command in server_commands {
            insert_sorted(
                self.server_commands
                    .entry(command.name.to_ascii_uppercase())
                    .or_default(),
                Prioritized {
                    priority: command.priority,
                    module: name.clone(),
                    item: command.handler,
                },
            );
        }

        let common = !channel_modes.is_empty()
            || !user_modes.is_empty()
            || declares_server_commands
            || module.required_on_all_servers();
        self.load_order.push(name.clone());
        self.modules.insert(name, LoadedModule { module, common });
        Ok(())
    }

    fn install_hooks(&mut self, module: &str, scope: ModeScope, letter: char, handler: &Rc<dyn ModeHandler>) {
        for (action, priority) in handler.affected_actions() {
            insert_sorted(
                self.mode_hooks.entry(action.to_string()).or_default(),
                Prioritized {
                    priority,
                    module: module.to_string(),
                    item: ModeHook {
                        scope,
                        letter,
                        handler: Rc::clone(handler),
                    },
                },
            );
        }
    }

    /// Remove every declaration of a module and hand the module back.
    pub fn unregister(&mut self, name: &str) -> Result<Rc<dyn Module>, RegistryError> {
        let Some(loaded) = self.modules.remove(name) else {
            return Err(RegistryError::NotLoaded(name.to_string()));
        };
        self.load_order.retain(|n| n != name);

        let mut removed_statuses = Vec::new();
        for modes in self.channel_modes.values_mut() {
            modes.retain(|letter, entry| {
                let keep = entry.module != name;
                if !keep && entry.mode_type == ModeType::Status {
                    removed_statuses.push(*letter);
                }
                keep
            });
        }
        self.channel_modes.retain(|_, modes| !modes.is_empty());
        self.channel_statuses
            .retain(|s| !removed_statuses.contains(&s.letter));
        for modes in self.user_modes.values_mut() {
            modes.retain(|_, entry| entry.module != name);
        }
        self.user_modes.retain(|_, modes| !modes.is_empty());

        fn strip<T>(table: &mut HashMap<String, Vec<Prioritized<T>>>, name: &str) {
            for list in table.values_mut() {
                list.retain(|e| e.module != name);
            }
            table.retain(|_, list| !list.is_empty());
        }
        strip(&mut self.actions, name);
        strip(&mut self.mode_hooks, name);
        strip(&mut self.user_commands, name);
        strip(&mut self.server_commands, name);

        Ok(loaded.module)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module(&self, name: &str) -> Option<Rc<dyn Module>> {
        self.modules.get(name).map(|m| Rc::clone(&m.module))
    }

    /// Loaded module names in load order.
    pub fn loaded(&self) -> &[String] {
        &self.load_order
    }

    /// Names of loaded modules that must match across a server link.
    pub fn common_modules(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .filter(|(_, m)| m.common)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn channel_mode(&self, letter: char) -> Option<&ModeEntry> {
        self.channel_modes.values().find_map(|m| m.get(&letter))
    }

    pub fn user_mode(&self, letter: char) -> Option<&ModeEntry> {
        self.user_modes.values().find_map(|m| m.get(&letter))
    }

    /// Mode entry for a scope.
    pub fn mode(&self, scope: ModeScope, letter: char) -> Option<&ModeEntry> {
        match scope {
            ModeScope::Channel => self.channel_mode(letter),
            ModeScope::User => self.user_mode(letter),
        }
    }

    /// Status modes, highest rank first; equal ranks in registration order.
    pub fn statuses(&self) -> &[StatusEntry] {
        &self.channel_statuses
    }

    pub fn status(&self, letter: char) -> Option<&StatusEntry> {
        self.channel_statuses.iter().find(|s| s.letter == letter)
    }

    pub fn status_rank(&self, letter: char) -> Option<i32> {
        self.status(letter).map(|s| s.rank)
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Plain handlers for an action, in dispatch order.
    pub fn action_handlers(&self, action: &str) -> Vec<ActionFn> {
        self.actions
            .get(action)
            .map(|list| list.iter().map(|e| Rc::clone(&e.item)).collect())
            .unwrap_or_default()
    }

    /// Priorities of the plain handlers for an action, in dispatch order.
    pub fn action_priorities(&self, action: &str) -> Vec<i32> {
        self.actions
            .get(action)
            .map(|list| list.iter().map(|e| e.priority).collect())
            .unwrap_or_default()
    }

    /// Mode hooks for an action, in dispatch order.
    pub fn mode_hooks(&self, action: &str) -> Vec<ModeHook> {
        self.mode_hooks
            .get(action)
            .map(|list| list.iter().map(|e| e.item.clone()).collect())
            .unwrap_or_default()
    }

    pub fn user_commands(&self, command: &str) -> Vec<Rc<dyn CommandHandler>> {
        self.user_commands
            .get(command)
            .map(|list| list.iter().map(|e| Rc::clone(&e.item)).collect())
            .unwrap_or_default()
    }

    pub fn server_commands(&self, command: &str) -> Vec<Rc<dyn CommandHandler>> {
        self.server_commands
            .get(command)
            .map(|list| list.iter().map(|e| Rc::clone(&e.item)).collect())
            .unwrap_or_default()
    }

    /// ISUPPORT tokens describing the installed modes.
    pub fn isupport(&self, max_modes: usize) -> Vec<String> {
        let letters = |modes: &BTreeMap<ModeType, BTreeMap<char, ModeEntry>>, ty: ModeType| -> String {
            modes
                .get(&ty)
                .map(|m| m.keys().collect())
                .unwrap_or_default()
        };
        let chanmodes = [
            ModeType::List,
            ModeType::ParamOnUnset,
            ModeType::Param,
            ModeType::NoParam,
        ]
        .map(|ty| letters(&self.channel_modes, ty))
        .join(",");
        let usermodes = [
            ModeType::List,
            ModeType::ParamOnUnset,
            ModeType::Param,
            ModeType::NoParam,
        ]
        .map(|ty| letters(&self.user_modes, ty))
        .join(",");
        let prefix_modes: String = self.channel_statuses.iter().map(|s| s.letter).collect();
        let prefix_symbols: String = self.channel_statuses.iter().map(|s| s.symbol).collect();

        vec![
            format!("CHANMODES={chanmodes}"),
            format!("PREFIX=({prefix_modes}){prefix_symbols}"),
            format!("STATUSMSG={prefix_symbols}"),
            format!("USERMODES={usermodes}"),
            format!("CHANNELLEN={CHANNEL_NAME_MAX}"),
            format!("MODES={max_modes}"),
            "CASEMAPPING=rfc1459".to_string(),
        ]
    }
}
