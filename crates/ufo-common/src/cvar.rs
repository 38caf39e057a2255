// cvar.rs — console variables: named, string-backed settings with cached float values

use std::collections::HashMap;

pub const CVAR_ARCHIVE: i32 = 1; // written to the config file
pub const CVAR_NOSET: i32 = 8; // can only be set from the command line
pub const CVAR_LATCH: i32 = 16; // changes only take effect on get_latched_vars

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

impl Cvar {
    pub fn integer(&self) -> i32 {
        self.value as i32
    }
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

/// The cvar registry. Lookups go through a name index.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        match self.cvar_index.get(name) {
            Some(&idx) => Some(&mut self.cvar_vars[idx]),
            None => None,
        }
    }

    /// Float value of a cvar, 0 if it does not exist.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    pub fn variable_integer(&self, name: &str) -> i32 {
        self.find_var(name).map_or(0, Cvar::integer)
    }

    /// String value of a cvar, "" if it does not exist.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Get or create a cvar. An existing cvar keeps its value and gains `flags`.
    /// Returns `None` when the cvar does not exist and no default was given.
    pub fn get(&mut self, name: &str, value: Option<&str>, flags: i32) -> Option<usize> {
        match self.cvar_index.get(name) {
            Some(&idx) => {
                self.cvar_vars[idx].flags |= flags;
                Some(idx)
            }
            None => value.map(|value| self.register(name, value, flags)),
        }
    }

    /// Registers a cvar with a default value and returns its index.
    pub fn register(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> Option<usize> {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, Some(value), 0),
        };
        let var = &mut self.cvar_vars[idx];

        if !force {
            if var.flags & CVAR_NOSET != 0 {
                log::warn!("{} is write protected.", name);
                return Some(idx);
            }

            if var.flags & CVAR_LATCH != 0 {
                let current = var.latched_string.as_deref().unwrap_or(&var.string);
                if value == current {
                    return Some(idx);
                }
                log::info!("{} will be changed on the next restart.", name);
                var.latched_string = Some(value.to_string());
                return Some(idx);
            }
        } else {
            var.latched_string = None;
        }

        if value == var.string {
            return Some(idx); // not changed
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        Some(idx)
    }

    /// Set a cvar value (respects NOSET and LATCH flags).
    pub fn set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET and LATCH).
    pub fn force_set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.set2(name, value, true)
    }

    pub fn set_value(&mut self, name: &str, value: f32) {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str);
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Clears the modified flag of `name`, returning whether it was set.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_mut(name) {
            Some(var) => std::mem::replace(&mut var.modified, false),
            None => false,
        }
    }

    /// Names of all modified cvars matching `prefix`; clears their flags.
    pub fn check_modified(&mut self, prefix: &str) -> Vec<String> {
        self.cvar_vars
            .iter_mut()
            .filter(|var| var.modified && var.name.starts_with(prefix))
            .map(|var| {
                var.modified = false;
                var.name.clone()
            })
            .collect()
    }

    /// Write all archived cvars to a writer.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.cvar_vars {
            if var.flags & CVAR_ARCHIVE != 0 {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }
}
