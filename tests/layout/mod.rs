mod detect;
mod executables;
mod fat;
mod invariants;
mod io;
mod media;
mod search;
