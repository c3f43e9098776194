//! Static text banks for generated crimes and sentences.
//!
//! Kept as plain data tables with a uniform random pick on top, so the
//! selection logic can be tested with a seeded RNG while the gameplay
//! path uses the thread RNG.

use rand::seq::SliceRandom;
use rand::Rng;

/// Accusations the judge can generate instead of typing one.
pub const CRIMES: &[&str] = &[
    "Posting cringe in #general",
    "Ghosting the squad for 3 weeks",
    "Eating chips with an open mic",
    "Using light mode unironically",
    "Backseat gaming during a clutch",
    "Pronouncing 'GIF' wrong",
    "Spamming @everyone for no reason",
    "Not boosting the server",
    "Playing music bot at 200% volume",
    "Stealing the last kill",
    "Being AFK during the ready check",
    "Having a chaotic desktop",
    "Not saying 'GG' after a loss",
    "Simping too hard",
    "Using comic sans",
    "Replying 'k' to a long paragraph",
    "Leaving only 1 second on the microwave",
    "Spoiling the movie ending 'by accident'",
    "Using 'Reply All' on a company-wide email",
    "Chewing loudly in voice chat",
    "Not cropping the meme before posting",
    "Sending voice messages longer than 2 minutes",
    "Asking a question that was just answered",
    "Linking a 30-minute YouTube video without a timestamp",
    "Saying 'I'm down' then sleeping immediately",
];

/// Sentences handed down after a regular guilty verdict.
pub const SENTENCES: &[&str] = &[
    "Must change nickname to 'Clown' for 24h",
    "Banned from using vowels in chat for 10m",
    "Must sing an apology song in VC",
    "Forced to use Light Mode for 5 minutes",
    "Must post a cringe selfie",
    "Cannot speak for 3 rounds",
    "Must compliment the Judge for 1 minute",
    "Sentenced to play League of Legends",
    "Publicly shamed in #announcements",
    "Must end every sentence with 'uwu' for 1 hour",
    "Forced to use a default Discord avatar for a week",
    "Banned from using emojis for 24 hours",
    "Must change status to 'I love Nickelback'",
    "Cannot mute mic for the next 30 minutes",
    "Must write a haiku about their crime",
    "Sentenced to be the server's personal butler for a day",
    "Must react to every message with a clown emoji",
    "Forced to stream their desktop while organizing it",
    "Must use 'Comic Sans' logic in all arguments",
    "Cannot say the word 'the' for 10 minutes",
    "Must send a heartfelt apology to a bot",
    "Required to narrate their own actions in 3rd person",
    "Banned from sharing memes for 48 hours",
    "Must wear a virtual 'Cone of Shame' (Status)",
    "Sentenced to explain FNAF lore to the chat",
    "Must reply with a GIF to every message for 10m",
    "Forced to listen to 1 hour of elevator music",
];

/// Harsher sentences reserved for contempt of court.
pub const SEVERE_SENTENCES: &[&str] = &[
    "BANNED: Must use only 'Meow' in chat for 24 hours.",
    "EXILE: Forbidden from entering Voice Chat for 3 days.",
    "SHAME: Must post a 500-word essay on why they are a coward.",
    "TOTAL LOCKDOWN: Forced to use a 'Pig' avatar for 1 week.",
    "COMMUNITY SERVICE: Must clean (moderate) the #general chat for 12 hours.",
    "PUBLIC EXECUTION: Judge can ban them from one specific channel for 24h.",
    "PERMANENT STIGMA: Must keep status as 'I LOST TO THE SYSTEM' for 48h.",
    "DIGITAL DEBT: Must react with a clown emoji to every message the Judge sends for a week.",
    "VOICE REVEAL: Must read the entire Discord Terms of Service out loud in VC.",
    "IDENTITY THEFT: Judge picks a new embarrassing nickname for them for 7 days.",
    "GHOSTED: Entire squad is forbidden from replying to them for 2 hours.",
    "THE GAUNTLET: Must play a game of the Judge's choice until they win 3 times.",
    "SOCIAL BANKRUPTCY: Must gift 1 server boost or post a cringe video dance.",
    "LABOR CAMP: Must invite 5 new bots to their personal test server and configure them.",
    "MEMORY WIPE: Must delete their most recent 100 messages in the server.",
    "TRIAL BY FIRE: Must solo-stream a horror game for 1 hour while the squad watches.",
];

/// Picks a uniformly random entry with the thread RNG.
pub fn pick(table: &'static [&'static str]) -> &'static str {
    pick_with(table, &mut rand::thread_rng())
}

/// Picks a uniformly random entry with a caller-supplied RNG.
pub fn pick_with<R: Rng + ?Sized>(table: &'static [&'static str], rng: &mut R) -> &'static str {
    table
        .choose(rng)
        .copied()
        .unwrap_or("Unspecified Crimes")
}
