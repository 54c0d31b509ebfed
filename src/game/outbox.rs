//! Buffered narrative output produced while the world lock is held

use super::catalog::Location;
use super::player::Roster;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Seen only by one player
    Private { to: String, text: String },
    /// Seen by everyone in the room except the listed names
    Room {
        location: Location,
        text: String,
        except: Vec<String>,
    },
}

#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tell(&mut self, to: &str, text: impl Into<String>) {
        self.deliveries.push(Delivery::Private {
            to: to.to_string(),
            text: text.into(),
        });
    }

    pub fn room(&mut self, location: &Location, text: impl Into<String>, except: &[&str]) {
        self.deliveries.push(Delivery::Room {
            location: location.clone(),
            text: text.into(),
            except: except.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /// Expand room broadcasts against the current roster into (recipient, text) pairs
    pub fn resolve(&mut self, roster: &Roster) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for d in self.drain() {
            match d {
                Delivery::Private { to, text } => out.push((to, text)),
                Delivery::Room {
                    location,
                    text,
                    except,
                } => {
                    for name in roster.occupants(&location) {
                        if !except.contains(&name) {
                            out.push((name, text.clone()));
                        }
                    }
                }
            }
        }
        out
    }

    /// Private texts addressed to `name`, in order
    #[cfg(test)]
    pub fn private_for(&self, name: &str) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Private { to, text } if to == name => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
