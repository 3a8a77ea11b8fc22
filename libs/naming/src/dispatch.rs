//! Name-server command sets
//!
//! Two dispatchers share one registry:
//!
//! - the **text** set answers line commands (`register /cam`) with
//!   human-readable text terminated by [`END_OF_MESSAGE`];
//! - the **structured** set answers with a [`Bottle`], reached directly or
//!   through the text command `bot`.
//!
//! Argument-count complaints from the text set are returned bare, without
//! the terminator.

use crate::registry::Registry;
use codec::{Bottle, Value};
use types::{Contact, END_OF_MESSAGE, WILDCARD};

/// Carriers `route` considers when the caller names none, best first
const ROUTE_PREFERENCE: &[&str] = &["local", "shmem", "mcast", "udp", "tcp", "text"];

const HELP: &str = "Here are some ways to use the name server:\n\
+ help\n\
+ list\n\
+ register $portname\n\
+ register $portname $carrier $ipAddress $portNumber\n\
  (if you want a field set automatically, write '...')\n\
+ unregister $portname\n\
+ query $portname\n\
+ set $portname $property $value\n\
+ get $portname $property\n\
+ check $portname $property\n\
+ match $portname $property $prefix\n\
+ route $port1 $port2\n\
+ gc\n";

pub fn terminate(text: &str) -> String {
    format!("{}{}", text, END_OF_MESSAGE)
}

/// Text reply line for a registration; empty for unknown contacts
pub fn textify(address: &Contact) -> String {
    address.registration_line()
}

/// Structured form of a registration
pub fn botify(address: &Contact) -> Bottle {
    let mut result = Bottle::new();
    result.add("port");
    if address.is_valid() {
        result
            .add(Bottle::new().with("name").with(address.name()))
            .add(Bottle::new().with("ip").with(address.host()))
            .add(Bottle::new().with("port_number").with(address.port()))
            .add(Bottle::new().with("carrier").with(address.carrier()));
    } else {
        result.add(
            Bottle::new()
                .with("error")
                .with(-2)
                .with("port not known"),
        );
    }
    result
}

/// Run a text command; `None` when the key is not a text command
pub(crate) fn dispatch_text(
    reg: &mut Registry,
    key: &str,
    remote: &str,
    args: &[&str],
) -> Option<String> {
    let reply = match key {
        "register" => cmd_register(reg, remote, args),
        "unregister" => cmd_unregister(reg, args),
        "query" => cmd_query(reg, args),
        "announce" => terminate("ok\n"),
        "help" => terminate(HELP),
        "set" => cmd_set(reg, args),
        "get" => cmd_get(reg, args),
        "check" => cmd_check(reg, args),
        "match" => cmd_match(reg, args),
        "list" => cmd_list(reg),
        "route" => cmd_route(reg, args),
        "gc" => terminate("No cleaning done.\n"),
        "bot" => cmd_bot(reg, args),
        _ => return None,
    };
    Some(reply)
}

/// Run a structured command; `None` when the key is not a structured command
pub(crate) fn dispatch_structured(reg: &mut Registry, key: &str, args: &[&str]) -> Option<Bottle> {
    let reply = match key {
        "list" => ncmd_list(reg, args),
        "query" => ncmd_query(reg, args),
        "version" => Bottle::new()
            .with("version")
            .with(reg.settings().version.as_str()),
        "set" => ncmd_set(reg, args),
        "get" => ncmd_get(reg, args),
        _ => return None,
    };
    Some(reply)
}

fn property_line(target: &str, key: &str, value: &str) -> String {
    terminate(&format!("port {} property {} = {}\n", target, key, value))
}

fn cmd_register(reg: &mut Registry, remote: &str, args: &[&str]) -> String {
    let Some(&name) = args.first() else {
        return "need at least one argument".to_string();
    };
    let carrier = args.get(1).copied().unwrap_or(WILDCARD);
    let machine = args.get(2).copied().unwrap_or(WILDCARD);
    let port = match args.get(3) {
        None => 0,
        Some(&WILDCARD) => 0,
        Some(text) => match text.parse::<i32>() {
            Ok(port) => port,
            Err(_) => return format!("port number must be an integer, not '{}'", text),
        },
    };

    let suggestion = Contact::new(name, machine, port, carrier);
    match reg.register(name, &suggestion, remote) {
        Ok(address) => terminate(&textify(&address)),
        Err(e) => terminate(&format!("registration of {} failed: {}\n", name, e)),
    }
}

fn cmd_unregister(reg: &mut Registry, args: &[&str]) -> String {
    match args.first() {
        Some(name) => terminate(&textify(&reg.unregister(name))),
        None => "need at least one argument".to_string(),
    }
}

fn cmd_query(reg: &mut Registry, args: &[&str]) -> String {
    match args.first() {
        Some(name) => terminate(&textify(&reg.query(name))),
        None => "need at least one argument".to_string(),
    }
}

fn cmd_set(reg: &mut Registry, args: &[&str]) -> String {
    let [target, key, values @ ..] = args else {
        return "need at least two arguments: the port name, and a key".to_string();
    };
    let record = reg.record(target);
    record.clear_prop(key);
    for value in values {
        record.add_prop(key, *value);
    }
    property_line(target, key, &record.get_prop(key))
}

fn cmd_get(reg: &mut Registry, args: &[&str]) -> String {
    let [target, key, ..] = args else {
        return "need exactly two arguments: the port name, and a key".to_string();
    };
    let value = reg.find(target).map(|r| r.get_prop(key)).unwrap_or_default();
    property_line(target, key, &value)
}

fn cmd_match(reg: &mut Registry, args: &[&str]) -> String {
    let [target, key, prefix, ..] = args else {
        return "need exactly three arguments: the port name, a key, and a prefix".to_string();
    };
    let value = reg
        .find(target)
        .map(|r| r.match_prop(key, prefix))
        .unwrap_or_default();
    property_line(target, key, &value)
}

fn cmd_check(reg: &mut Registry, args: &[&str]) -> String {
    let [target, key, values @ ..] = args else {
        return "need at least two arguments: the port name, and a key".to_string();
    };
    let record = reg.find(target);
    let lines: Vec<String> = values
        .iter()
        .map(|value| {
            format!(
                "port {} property {} value {} present {}",
                target,
                key,
                value,
                record.map(|r| r.check_prop(key, value)).unwrap_or(false)
            )
        })
        .collect();
    terminate(&format!("{}\n", lines.join("\n")))
}

fn cmd_list(reg: &mut Registry) -> String {
    let mut lines: Vec<String> = reg.records().map(|r| textify(r.address())).collect();
    lines.sort();
    terminate(&lines.concat())
}

fn cmd_route(reg: &mut Registry, args: &[&str]) -> String {
    let [src, dest, carriers @ ..] = args else {
        return terminate(
            "need at least two arguments: the source port and the target port\n\
             (followed by an optional list of carriers in decreasing order of desirability)",
        );
    };
    let carriers: Vec<&str> = if carriers.is_empty() {
        ROUTE_PREFERENCE.to_vec()
    } else {
        carriers.to_vec()
    };

    let src_rec = reg.find(src).cloned().unwrap_or_default();
    let dest_rec = reg.find(dest).cloned().unwrap_or_default();
    let chosen = carriers.into_iter().find(|carrier| {
        if !src_rec.check_prop("offers", carrier) || !dest_rec.check_prop("accepts", carrier) {
            return false;
        }
        match *carrier {
            "local" => {
                src_rec.get_prop("ips") == dest_rec.get_prop("ips")
                    && src_rec.get_prop("process") == dest_rec.get_prop("process")
            }
            "shmem" => src_rec.get_prop("ips") == dest_rec.get_prop("ips"),
            _ => true,
        }
    });

    let target = match chosen {
        Some(carrier) => format!("{}:/{}", carrier, dest),
        None => dest.to_string(),
    };
    terminate(&format!("port {} route {} = {}\n", src, dest, target))
}

fn cmd_bot(reg: &mut Registry, args: &[&str]) -> String {
    let Some((key, rest)) = args.split_first() else {
        return String::new();
    };
    dispatch_structured(reg, key, rest)
        .map(|b| b.to_string())
        .unwrap_or_default()
}

fn ncmd_list(reg: &mut Registry, args: &[&str]) -> Bottle {
    let prefix = if args.len() == 1 { args[0] } else { "" };
    let mut response = Bottle::new().with("ports");
    for record in reg.records() {
        let address = record.address();
        if address.is_valid() && name_in_scope(address.name(), prefix) {
            response.add(botify(address));
        }
    }
    response
}

/// `name` equals `prefix`, or continues it at a `/` boundary
fn name_in_scope(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
}

fn ncmd_query(reg: &mut Registry, args: &[&str]) -> Bottle {
    match args {
        [name] => botify(&reg.query(name)),
        _ => Bottle::new(),
    }
}

fn ncmd_set(reg: &mut Registry, args: &[&str]) -> Bottle {
    let [target, key, values @ ..] = args else {
        return Bottle::new();
    };
    let record = reg.record(target);
    record.clear_prop(key);
    for value in values {
        record.add_prop(key, *value);
    }
    Bottle::new().with("ok")
}

fn ncmd_get(reg: &mut Registry, args: &[&str]) -> Bottle {
    let [target, key] = args else {
        return Bottle::new();
    };
    let value = reg.find(target).map(|r| r.get_prop(key)).unwrap_or_default();
    Bottle::from_text(&value).unwrap_or_else(|_| Bottle::new().with(Value::from(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_in_scope() {
        assert!(name_in_scope("/robot/arm", "/robot"));
        assert!(name_in_scope("/robot", "/robot"));
        assert!(name_in_scope("/robot/arm", "/robot/"));
        assert!(!name_in_scope("/robotics", "/robot"));
        assert!(name_in_scope("/anything", ""));
    }

    #[test]
    fn test_botify_unknown() {
        assert_eq!(
            botify(&Contact::empty()).to_string(),
            "port (error -2 \"port not known\")"
        );
    }

    #[test]
    fn test_botify_known() {
        let contact = Contact::new("/cam", "127.0.0.1", 10_002, "tcp");
        assert_eq!(
            botify(&contact).to_string(),
            "port (name /cam) (ip 127.0.0.1) (port_number 10002) (carrier tcp)"
        );
    }
}
