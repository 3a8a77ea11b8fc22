//! Name service behaviour through its public command interface

use codec::Bottle;
use naming::{NameEvent, NameService, NameServiceSettings, END_OF_MESSAGE};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use types::Contact;

fn remote() -> Contact {
    Contact::by_socket("tcp", "10.0.0.2", 40_000)
}

fn ask(service: &NameService, command: &str) -> String {
    service.apply(&format!("NAME_SERVER {}", command), &remote())
}

mod text_commands {
    use super::*;

    #[test]
    fn test_register_fills_wildcards() {
        let service = NameService::default();
        assert_eq!(
            ask(&service, "register /cam"),
            "registration name /cam ip 10.0.0.2 port 10002 type tcp\n*** end of message"
        );
        assert_eq!(
            ask(&service, "register /mic udp ... ..."),
            "registration name /mic ip 10.0.0.2 port 10012 type udp\n*** end of message"
        );
        assert_eq!(
            ask(&service, "register /fixed tcp 192.168.0.4 9000"),
            "registration name /fixed ip 192.168.0.4 port 9000 type tcp\n*** end of message"
        );
    }

    #[test]
    fn test_query_and_unregister() {
        let service = NameService::default();
        ask(&service, "register /cam");
        assert!(ask(&service, "query /cam").starts_with("registration name /cam ip 10.0.0.2"));
        assert_eq!(ask(&service, "unregister /cam"), END_OF_MESSAGE);
        assert_eq!(ask(&service, "query /cam"), END_OF_MESSAGE);
        assert!(!service.query_name("/cam").is_valid());
    }

    #[test]
    fn test_anonymous_names() {
        let service = NameService::default();
        let reply = ask(&service, "register ...");
        assert!(reply.starts_with("registration name /tmp/port/1 "));
        ask(&service, "unregister /tmp/port/1");
        assert!(ask(&service, "register ...").starts_with("registration name /tmp/port/1 "));
        assert!(ask(&service, "register ...").starts_with("registration name /tmp/port/2 "));
    }

    #[test]
    fn test_properties() {
        let service = NameService::default();
        assert_eq!(
            ask(&service, "set /cam offers tcp udp"),
            "port /cam property offers = tcp udp\n*** end of message"
        );
        assert_eq!(
            ask(&service, "get /cam offers"),
            "port /cam property offers = tcp udp\n*** end of message"
        );
        assert_eq!(
            ask(&service, "check /cam offers tcp shmem"),
            "port /cam property offers value tcp present true\n\
             port /cam property offers value shmem present false\n*** end of message"
        );
        ask(&service, "set /cam ips 10.0.0.2 192.168.1.7");
        assert_eq!(
            ask(&service, "match /cam ips 192."),
            "port /cam property ips = 192.168.1.7\n*** end of message"
        );
        assert!(service.check_prop("/cam", "offers", "udp"));
    }

    #[test]
    fn test_reads_do_not_create_records() {
        let service = NameService::default();
        for i in 0..1000 {
            ask(&service, &format!("get /ghost{} color", i));
        }
        ask(&service, "match /ghost check 1");
        ask(&service, "check /ghost offers tcp");
        ask(&service, "route /ghost /phantom");
        service.apply_bottle(&Bottle::from_text("get /ghost color").unwrap(), &remote());
        assert_eq!(service.record_count(), 0);

        ask(&service, "register /cam");
        ask(&service, "set /cam offers tcp");
        assert_eq!(service.record_count(), 1);
        ask(&service, "unregister /cam");
        assert_eq!(service.record_count(), 0);
        assert_eq!(
            ask(&service, "get /cam offers"),
            "port /cam property offers = \n*** end of message"
        );
    }

    #[test]
    fn test_net_query_form() {
        let service = NameService::default();
        ask(&service, "register /cam tcp 10.0.0.2 10002");
        ask(&service, "set /cam ips 10.0.0.2 192.168.1.7");
        assert_eq!(
            ask(&service, "query /net=192.168/cam"),
            "registration name /cam ip 192.168.1.7 port 10002 type tcp\n*** end of message"
        );
    }

    #[test]
    fn test_route_prefers_first_shared_carrier() {
        let service = NameService::default();
        ask(&service, "set /a offers tcp shmem udp");
        ask(&service, "set /b accepts shmem tcp");
        ask(&service, "set /a ips 10.0.0.1");
        ask(&service, "set /b ips 10.0.0.9");
        assert_eq!(
            ask(&service, "route /a /b"),
            "port /a route /b = tcp://b\n*** end of message"
        );

        ask(&service, "set /b ips 10.0.0.1");
        assert_eq!(
            ask(&service, "route /a /b"),
            "port /a route /b = shmem://b\n*** end of message"
        );
        assert_eq!(
            ask(&service, "route /a /b text"),
            "port /a route /b = /b\n*** end of message"
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let service = NameService::default();
        ask(&service, "register /zeta");
        ask(&service, "register /alpha");
        let reply = ask(&service, "list");
        let lines: Vec<&str> = reply.lines().collect();
        assert!(lines[0].starts_with("registration name /alpha "));
        assert!(lines[1].starts_with("registration name /zeta "));
        assert_eq!(lines[2], END_OF_MESSAGE);
    }

    #[test]
    fn test_fixed_replies() {
        let service = NameService::default();
        assert_eq!(ask(&service, "announce /cam"), "ok\n*** end of message");
        assert_eq!(ask(&service, "gc"), "No cleaning done.\n*** end of message");
        assert!(ask(&service, "help").contains("+ route $port1 $port2\n"));
    }

    #[test]
    fn test_bad_arguments_are_unterminated() {
        let service = NameService::default();
        assert_eq!(ask(&service, "register"), "need at least one argument");
        assert_eq!(
            ask(&service, "set /cam"),
            "need at least two arguments: the port name, and a key"
        );
        assert_eq!(service.apply("NAME_SERVER", &remote()), "no command given");
    }

    #[test]
    fn test_unknown_command_gets_help_hint() {
        let service = NameService::default();
        let reply = ask(&service, "frobnicate /cam");
        assert!(reply.starts_with("unknown command NAME_SERVER frobnicate /cam"));
        assert!(reply.contains("help"));
        assert!(reply.ends_with(END_OF_MESSAGE));
    }
}

mod structured_commands {
    use super::*;

    #[test]
    fn test_bot_query() {
        let service = NameService::default();
        ask(&service, "register /cam tcp 127.0.0.1 10002");
        assert_eq!(
            ask(&service, "bot query /cam"),
            "port (name /cam) (ip 127.0.0.1) (port_number 10002) (carrier tcp)"
        );
        assert_eq!(
            ask(&service, "bot query /nobody"),
            "port (error -2 \"port not known\")"
        );
    }

    #[test]
    fn test_bot_list_respects_prefix() {
        let service = NameService::default();
        ask(&service, "register /robot/arm tcp 127.0.0.1 10002");
        ask(&service, "register /robotics tcp 127.0.0.1 10012");
        let all = Bottle::from_text(&ask(&service, "bot list")).unwrap();
        assert_eq!(all.len(), 3);
        let scoped = Bottle::from_text(&ask(&service, "bot list /robot")).unwrap();
        assert_eq!(scoped.len(), 2);
    }

    #[test]
    fn test_version_falls_through_to_structured() {
        let service = NameService::new(NameServiceSettings {
            version: "3.1.4-test".to_string(),
            ..Default::default()
        });
        assert_eq!(ask(&service, "version"), "version 3.1.4-test\n*** end of message");
    }

    #[test]
    fn test_apply_bottle() {
        let service = NameService::default();
        let reply = service.apply_bottle(&Bottle::from_text("register /cam").unwrap(), &remote());
        assert_eq!(
            reply.get(0).and_then(|v| v.as_str()),
            Some("registration name /cam ip 10.0.0.2 port 10002 type tcp")
        );

        let reply = service.apply_bottle(&Bottle::from_text("query /cam").unwrap(), &remote());
        assert_eq!(reply.find("port_number").and_then(|v| v.as_i32()), Some(10_002));

        let reply = service.apply_bottle(&Bottle::from_text("set /cam color red").unwrap(), &remote());
        assert_eq!(reply.to_string(), "ok");
        assert_eq!(service.get_prop("/cam", "color"), "red");
    }
}

mod allocation {
    use super::*;

    #[test]
    fn test_multicast_groups_are_reused_after_release() {
        let service = NameService::default();
        let a = service
            .register_name("/m1", &Contact::by_name("/m1").with_carrier("mcast"), "h")
            .unwrap();
        let b = service
            .register_name("/m2", &Contact::by_name("/m2").with_carrier("mcast"), "h")
            .unwrap();
        assert_eq!(a.host(), "224.1.1.1");
        assert_eq!(b.host(), "224.1.1.2");
        assert_eq!(a.port(), 10_002);
        assert_eq!(b.port(), 10_003);

        assert_eq!(service.free_multicast_groups(), 0);
        service.unregister_name("/m1");
        assert_eq!(service.free_multicast_groups(), 1);
        let c = service
            .register_name("/m3", &Contact::by_name("/m3").with_carrier("mcast"), "h")
            .unwrap();
        assert_eq!(service.free_multicast_groups(), 0);
        assert!(c.host().starts_with("224.1."));
    }

    #[test]
    fn test_ports_are_per_host() {
        let service = NameService::default();
        let a = service.register_name("/a", &Contact::by_name("/a"), "10.0.0.1").unwrap();
        let b = service.register_name("/b", &Contact::by_name("/b"), "10.0.0.2").unwrap();
        assert_eq!(a.port(), b.port());
        let c = service.register_name("/c", &Contact::by_name("/c"), "10.0.0.1").unwrap();
        assert_eq!(c.port(), a.port() + 10);
    }

    #[test]
    fn test_events_follow_registrations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let service = NameService::default().with_event_listener(move |event| {
            sink.lock().push(event.clone());
        });

        ask(&service, "register /cam");
        ask(&service, "unregister /cam");
        ask(&service, "unregister /cam");
        assert_eq!(
            *seen.lock(),
            vec![NameEvent::added("/cam"), NameEvent::removed("/cam")]
        );
        assert_eq!(seen.lock()[1].to_string(), "[del] /cam");
    }
}

mod concurrency {
    use super::*;

    #[test_log::test]
    fn test_concurrent_registrations_never_collide() {
        let service = Arc::new(NameService::default());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let watcher = {
            let service = service.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    for contact in service.registrations() {
                        assert!(!contact.host_missing());
                        assert!(!contact.carrier_missing());
                        assert!(contact.port() > 0);
                    }
                }
            })
        };

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let service = service.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let name = format!("/w{}/p{}", worker, i);
                            service
                                .register_name(&name, &Contact::by_name(name.as_str()), "10.0.0.5")
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ports = HashSet::new();
        for worker in workers {
            for contact in worker.join().unwrap() {
                assert!(ports.insert(contact.port()), "port {} issued twice", contact.port());
            }
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        watcher.join().unwrap();
        assert_eq!(service.registrations().len(), 400);
    }
}
