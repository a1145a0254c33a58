// Built-in street table for the Norilsk network.
//
// Sequences are written in authored order; `Street::authored` reverses them.

use super::{StopRef, Street};

/// Stop entry as written in the table: plain id or id opening a new segment.
enum Entry {
    Stop(u32),
    Border(u32),
}

use Entry::{Border, Stop};

fn seq(entries: &[Entry]) -> Vec<StopRef> {
    entries
        .iter()
        .map(|entry| match entry {
            Stop(id) => StopRef::new(id.to_string()),
            Border(id) => StopRef::border(id.to_string()),
        })
        .collect()
}

pub(super) fn builtin_streets() -> Vec<Street> {
    let kayerkan = [
        Stop(22613), Stop(22614), Stop(22615), Stop(22616), Stop(37128), Stop(37129),
        Stop(37130), Stop(37131), Stop(22617), Stop(22618), Stop(22619), Stop(22621),
    ];

    vec![
        Street::authored(
            "Ленина",
            seq(&[
                Stop(22411), Stop(22344), Stop(22340), Stop(22341), Stop(22342), Stop(22345), Border(22369), Stop(22370),
                Stop(22371), Stop(22372), Stop(22373), Stop(22374), Border(22413), Stop(22331), Stop(22332),
            ]),
            seq(&[
                Stop(22392), Stop(22393), Stop(22394), Stop(22395), Border(22356), Stop(22357), Stop(22376), Border(22377),
                Stop(22436), Stop(22379), Stop(22380), Stop(22381), Stop(22382), Stop(22383), Border(22346),
            ]),
            false,
        ),
        Street::authored(
            "Талнахская",
            seq(&[
                Stop(22411), Stop(22344), Stop(22383), Stop(22346), Border(22347), Stop(22348), Stop(22349),
                Stop(22350), Stop(22351), Stop(22352), Stop(22353), Border(22354), Stop(22355), Stop(22356),
            ]),
            seq(&[
                Stop(22392), Stop(22393), Stop(22394), Stop(22395), Border(22332), Stop(22333), Stop(22334), Border(22335),
                Stop(22336), Stop(22337), Stop(22338), Stop(22339), Stop(22340), Stop(22341), Stop(22342), Border(22343),
            ]),
            false,
        ),
        Street::authored(
            "Комсомольская",
            seq(&[Stop(22345), Stop(22326), Stop(22327), Stop(22328), Stop(22329), Stop(22330), Stop(22331), Stop(22332)]),
            seq(&[Stop(22356), Stop(22357), Stop(22358), Stop(22359), Stop(22360), Stop(22361), Stop(22346)]),
            false,
        ),
        Street::authored("Кайеркан", seq(&kayerkan), seq(&kayerkan), true),
    ]
}
