//! Resolver configuration
//!
//! The stub resolver is configured through a [`ResolvConf`]. It contains
//! the name servers to query and a set of options that influence how the
//! servers are asked. It is normally read from the system’s
//! `/etc/resolv.conf` and is modeled along the lines of glibc’s resolver.

use crate::base::name::{Name, NameError};
use std::io::{self, BufRead, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::SplitWhitespace;
use std::time::Duration;
use std::{error, fmt, fs};

//------------ ResolvOptions -------------------------------------------------

/// Options for the resolver configuration.
///
/// Only the options that have an effect on the stub resolver are kept.
/// Everything else glibc knows about is accepted when parsing and then
/// ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvOptions {
    /// Always use TCP.
    pub use_vc: bool,

    /// Set the recursion desired bit in queries.
    ///
    /// Enabled by default.
    pub recurse: bool,

    /// Use round-robin selection of name servers.
    pub rotate: bool,

    /// Use EDNS0.
    pub use_edns0: bool,
}

impl Default for ResolvOptions {
    fn default() -> Self {
        ResolvOptions {
            use_vc: false,
            recurse: true,
            rotate: false,
            use_edns0: false,
        }
    }
}

//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// This type collects all information necessary to configure how a stub
/// resolver talks to its upstream resolvers.
///
/// The type follows the builder pattern. After creating a value with
/// `ResolvConf::new()` you can manipulate the members. Once you are happy
/// with them, you call `finalize()` to make sure the configuration is valid.
/// It mostly just fixes the `servers`.
///
/// Additionally, the type can parse a glibc-style configuration file,
/// commonly known as `/etc/resolv.conf` through the `parse()` and
/// `parse_file()` methods. You still need to call `finalize()` after
/// parsing.
///
/// The easiest way to get the system resolver configuration is through
/// `ResolvConf::system()`. This will parse the configuration file or return
/// a default configuration if that fails.
#[derive(Clone, Debug)]
pub struct ResolvConf {
    /// Addresses of servers to query.
    pub servers: Vec<SocketAddr>,

    /// Search list for host-name lookup.
    ///
    /// The stub resolver only ever queries absolute names, so this is
    /// kept for information only.
    pub search: Vec<Name>,

    /// Number of dots before an initial absolute query is made.
    pub ndots: usize,

    /// Timeout to wait for a response.
    pub timeout: Duration,

    /// Number of rounds through the server list before giving up.
    pub attempts: usize,

    /// Default options.
    pub options: ResolvOptions,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new, empty configuration.
    ///
    /// Using an empty configuration will fail since it does not contain
    /// any name servers. Call `self.finalize()` to make it usable.
    pub fn new() -> Self {
        ResolvConf {
            servers: Vec::new(),
            search: Vec::new(),
            ndots: 1,
            timeout: Duration::from_secs(5),
            attempts: 2,
            options: ResolvOptions::default(),
        }
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, adds `127.0.0.1:53`. This is exactly what
    /// glibc does. Also makes sure there is at least one attempt.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
            self.servers.push(SocketAddr::new(addr, 53));
        }
        if self.attempts == 0 {
            self.attempts = 1;
        }
    }

    /// Creates the configuration for this system.
    ///
    /// Reads `/etc/resolv.conf`. If that fails, the default configuration
    /// is used.
    pub fn system() -> Self {
        let mut res = ResolvConf::new();
        if res.parse_file("/etc/resolv.conf").is_err() {
            res = ResolvConf::new();
        }
        res.finalize();
        res
    }
}

impl Default for ResolvConf {
    fn default() -> Self {
        Self::new()
    }
}

/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                Some("domain") => self.parse_domain(words)?,
                Some("search") => self.parse_search(words)?,
                Some("sortlist") => { /* ignored */ }
                Some("options") => self.parse_options(words)?,
                _ => return Err(Error::Parse),
            }
        }
        Ok(())
    }

    fn parse_nameserver(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        for addr in (next_word(&mut words)?, 53).to_socket_addrs()? {
            self.servers.push(addr)
        }
        no_more_words(words)
    }

    fn parse_domain(&mut self, mut words: SplitWhitespace) -> Result<(), Error> {
        let domain = next_word(&mut words)?.parse::<Name>()?;
        self.search = vec![domain];
        no_more_words(words)
    }

    fn parse_search(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        let mut search = Vec::new();
        for word in words {
            search.push(word.parse::<Name>()?)
        }
        self.search = search;
        Ok(())
    }

    fn parse_options(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        for word in words {
            match split_arg(word)? {
                ("ndots", Some(n)) => self.ndots = n,
                ("timeout", Some(n)) => {
                    self.timeout = Duration::from_secs(n as u64)
                }
                ("attempts", Some(n)) => self.attempts = n,
                ("rotate", None) => self.options.rotate = true,
                ("edns0", None) => self.options.use_edns0 = true,
                ("use-vc", None) => self.options.use_vc = true,
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
        Ok(())
    }
}

//--- Display

impl fmt::Display for ResolvConf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for server in self.servers.iter() {
            let server = *server;
            if server.port() == 53 {
                writeln!(f, "nameserver {}", server.ip())?;
            } else {
                writeln!(f, "nameserver {}", server)?;
            }
        }
        if self.search.len() == 1 {
            writeln!(f, "domain {}", self.search[0])?;
        } else if self.search.len() > 1 {
            f.write_str("search")?;
            for name in self.search.iter() {
                write!(f, " {}", name)?;
            }
            f.write_str("\n")?;
        }

        // Collect options so we only print them if there are any non-default
        // ones.
        let mut options = Vec::new();

        if self.ndots != 1 {
            options.push(format!("ndots:{}", self.ndots));
        }
        if self.timeout != Duration::from_secs(5) {
            options.push(format!("timeout:{}", self.timeout.as_secs()));
        }
        if self.attempts != 2 {
            options.push(format!("attempts:{}", self.attempts));
        }
        if self.options.use_vc {
            options.push("use-vc".into())
        }
        if self.options.rotate {
            options.push("rotate".into())
        }
        if self.options.use_edns0 {
            options.push("edns0".into())
        }

        if !options.is_empty() {
            f.write_str("options")?;
            for option in options {
                write!(f, " {}", option)?;
            }
            f.write_str("\n")?;
        }

        Ok(())
    }
}

//------------ Private Helpers -----------------------------------------------

/// Returns a reference to the next word or an error.
fn next_word<'a>(words: &mut SplitWhitespace<'a>) -> Result<&'a str, Error> {
    words.next().ok_or(Error::Parse)
}

/// Returns nothing but errors out if there are words left.
fn no_more_words(mut words: SplitWhitespace) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::Parse),
        None => Ok(()),
    }
}

/// Splits the name and argument from an option with arguments.
///
/// These options consist of a name followed by a colon followed by a
/// value, which so far is only `usize`, so we do that.
fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.split_once(':') {
        Some((left, right)) => Ok((left, Some(right.parse()?))),
        None => Ok((s, None)),
    }
}

//------------ Error ---------------------------------------------------------

/// The error that can happen when parsing `resolv.conf`.
#[derive(Debug)]
pub enum Error {
    /// The file is not a proper file.
    Parse,

    /// Something happend while reading.
    Io(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Parse => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<NameError> for Error {
    fn from(_: NameError) -> Error {
        Error::Parse
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(_: std::num::ParseIntError) -> Error {
        Error::Parse
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse => f.write_str("error parsing configuration"),
            Error::Io(err) => write!(f, "{}", err),
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_resolv_conf() {
        let mut conf = ResolvConf::new();
        let data = "nameserver 192.0.2.0\n\
                    nameserver 192.0.2.1\n\
                    options use-vc ndots:122\n"
            .to_string();
        assert!(conf.parse(&mut io::Cursor::new(data)).is_ok());
        assert!(conf.options.use_vc);
        assert_eq!(conf.ndots, 122);
        assert_eq!(conf.servers.len(), 2);
        assert_eq!(conf.servers[1], "192.0.2.1:53".parse().unwrap());
    }

    #[test]
    fn parse_options_and_comments() {
        let mut conf = ResolvConf::new();
        let data = "# comment\n\
                    ; another one\n\
                    \n\
                    nameserver 2001:db8::53\n\
                    search example.com example.net\n\
                    sortlist 130.155.160.0/255.255.240.0\n\
                    options timeout:1 attempts:4 rotate edns0 inet6\n";
        conf.parse(&mut data.as_bytes()).unwrap();
        assert_eq!(conf.servers, vec!["[2001:db8::53]:53".parse().unwrap()]);
        assert_eq!(conf.search.len(), 2);
        assert_eq!(conf.timeout, Duration::from_secs(1));
        assert_eq!(conf.attempts, 4);
        assert!(conf.options.rotate);
        assert!(conf.options.use_edns0);
        assert!(!conf.options.use_vc);
    }

    #[test]
    fn parse_errors() {
        let mut conf = ResolvConf::new();
        assert!(matches!(
            conf.parse(&mut "frobnicate yes\n".as_bytes()),
            Err(Error::Parse)
        ));
        assert!(matches!(
            conf.parse(&mut "nameserver\n".as_bytes()),
            Err(Error::Parse)
        ));
        assert!(matches!(
            conf.parse(&mut "options timeout:soon\n".as_bytes()),
            Err(Error::Parse)
        ));
        assert!(matches!(
            conf.parse(&mut "domain a..b\n".as_bytes()),
            Err(Error::Parse)
        ));
    }

    #[test]
    fn finalize_and_display() {
        let mut conf = ResolvConf::new();
        conf.attempts = 0;
        conf.finalize();
        assert_eq!(conf.servers, vec!["127.0.0.1:53".parse().unwrap()]);
        assert_eq!(conf.attempts, 1);
        conf.options.rotate = true;
        assert_eq!(
            conf.to_string(),
            "nameserver 127.0.0.1\noptions attempts:1 rotate\n"
        );
    }
}
