use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use peersearch::errors::NodeError;
use peersearch::{Node, PeerAddress, SearchMode, SearchOutcome};

const WAIT: Duration = Duration::from_secs(5);

/// Polls `check` until it holds or [WAIT] elapses.
fn eventually(check: impl Fn() -> bool) -> bool {
    let start = Instant::now();

    while start.elapsed() < WAIT {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }

    check()
}

fn addr(node: &Node) -> PeerAddress {
    node.local_addr().unwrap()
}

/// Links `node` with each of `others` in both directions.
fn link(node: &Node, others: &[&Node]) {
    let addresses: Vec<_> = others.iter().map(|other| addr(other)).collect();

    for (_, acknowledged) in node.greet_neighbors(&addresses).unwrap() {
        assert!(acknowledged);
    }

    for other in others {
        let address = addr(node);
        assert!(eventually(|| other.neighbors().unwrap().contains(&address)));
    }
}

/// `a - b - c` with `apple` stored at `c`.
fn line() -> (Node, Node, Node) {
    let a = Node::client().unwrap();
    let b = Node::client().unwrap();
    let c = Node::builder().keys([("apple", "red")]).build().unwrap();

    link(&b, &[&a, &c]);

    (a, b, c)
}

fn unused_address() -> PeerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    PeerAddress::from(listener.local_addr().unwrap())
}

#[test]
fn hello_and_bye() {
    let a = Node::client().unwrap();
    let b = Node::client().unwrap();

    let offline = unused_address();

    let results = a.greet_neighbors(&[addr(&b), offline]).unwrap();
    assert_eq!(results, vec![(addr(&b), true), (offline, false)]);
    assert_eq!(a.neighbors().unwrap(), vec![addr(&b)]);
    assert!(eventually(|| b.neighbors().unwrap() == vec![addr(&a)]));

    assert!(a.send_hello(0).unwrap());
    assert!(matches!(
        a.send_hello(1),
        Err(NodeError::InvalidNeighborIndex(1))
    ));

    assert_eq!(a.send_bye_to_all().unwrap(), 1);
    assert!(eventually(|| b.neighbors().unwrap().is_empty()));
    // The sender keeps its own table.
    assert_eq!(a.neighbors().unwrap(), vec![addr(&b)]);

    a.shutdown();
    b.shutdown();
}

#[test]
fn flood() {
    let (a, b, c) = line();

    let response = a.search(SearchMode::Flood, "apple").unwrap();

    match response.recv_timeout(WAIT) {
        Some(SearchOutcome::Found {
            mode,
            key,
            value,
            hop_count,
            holder,
        }) => {
            assert_eq!(mode, SearchMode::Flood);
            assert_eq!(key, "apple");
            assert_eq!(value, "red");
            assert_eq!(hop_count, 2);
            assert_eq!(holder, addr(&c));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let statistics = a.statistics().unwrap();
    let summary = statistics.hop_summary(SearchMode::Flood).unwrap();
    assert_eq!(summary.samples, 1);
    assert_eq!(summary.mean, 2.0);

    assert_eq!(b.statistics().unwrap().seen(SearchMode::Flood), 1);
    assert_eq!(c.statistics().unwrap().seen(SearchMode::Flood), 1);

    for node in [a, b, c] {
        node.shutdown();
    }
}

#[test]
fn random_walk() {
    let (a, b, c) = line();

    let response = a.search(SearchMode::RandomWalk, "apple").unwrap();

    match response.recv_timeout(WAIT) {
        Some(SearchOutcome::Found {
            hop_count, holder, ..
        }) => {
            assert_eq!(hop_count, 2);
            assert_eq!(holder, addr(&c));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(b.statistics().unwrap().seen(SearchMode::RandomWalk), 1);

    for node in [a, b, c] {
        node.shutdown();
    }
}

#[test]
fn depth_first_finds_key() {
    let (a, b, c) = line();

    let response = a.search(SearchMode::DepthFirst, "apple").unwrap();

    match response.recv_timeout(WAIT) {
        Some(SearchOutcome::Found {
            mode, hop_count, ..
        }) => {
            assert_eq!(mode, SearchMode::DepthFirst);
            assert_eq!(hop_count, 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    for node in [a, b, c] {
        node.shutdown();
    }
}

#[test]
fn depth_first_exhausts_triangle() {
    let a = Node::client().unwrap();
    let b = Node::client().unwrap();
    let c = Node::client().unwrap();

    link(&a, &[&b, &c]);
    link(&b, &[&c]);

    let mut response = a.search(SearchMode::DepthFirst, "missing").unwrap();

    assert_eq!(
        response.recv_timeout(WAIT),
        Some(SearchOutcome::Exhausted {
            key: "missing".to_string()
        })
    );
    // Exhaustion ends the response.
    assert_eq!(response.next(), None);

    for node in [a, b, c] {
        node.shutdown();
    }
}

#[test]
fn expired_search_is_dropped() {
    let (a, b, c) = line();

    a.set_default_ttl(1).unwrap();

    let response = a.search(SearchMode::Flood, "apple").unwrap();

    assert!(eventually(|| b.statistics().unwrap().seen(SearchMode::Flood) == 1));
    assert_eq!(response.recv_timeout(Duration::from_millis(300)), None);
    assert_eq!(c.statistics().unwrap().seen(SearchMode::Flood), 0);

    for node in [a, b, c] {
        node.shutdown();
    }
}

#[test]
fn shutdown_says_bye() {
    let a = Node::client().unwrap();
    let b = Node::client().unwrap();

    link(&a, &[&b]);

    b.shutdown();

    assert!(eventually(|| a.neighbors().unwrap().is_empty()));
    assert!(b.info().is_err());

    a.shutdown();
}

#[test]
fn bootstrap_files() {
    let a = Node::client().unwrap();
    let b = Node::client().unwrap();

    let dir = std::env::temp_dir();
    let neighbors = dir.join(format!("peersearch-neighbors-{}.txt", std::process::id()));
    let keys = dir.join(format!("peersearch-keys-{}.txt", std::process::id()));

    std::fs::write(&neighbors, format!("{}\n\n", addr(&b))).unwrap();
    std::fs::write(&keys, "apple red\npear green\n").unwrap();

    assert_eq!(
        a.bootstrap_neighbors(&neighbors).unwrap(),
        vec![(addr(&b), true)]
    );
    a.bootstrap_keys(&keys).unwrap();

    assert_eq!(a.info().unwrap().keys(), 2);

    let response = a.search(SearchMode::Flood, "pear").unwrap();
    assert_eq!(
        response.recv_timeout(WAIT),
        Some(SearchOutcome::Local {
            mode: SearchMode::Flood,
            key: "pear".to_string(),
            value: "green".to_string(),
        })
    );

    std::fs::write(&keys, "broken\n").unwrap();
    assert!(matches!(
        a.bootstrap_keys(&keys),
        Err(NodeError::Format(_))
    ));

    let _ = std::fs::remove_file(neighbors);
    let _ = std::fs::remove_file(keys);

    a.shutdown();
    b.shutdown();
}
