use std::io::{self, Write};

/// A sink with an explicit close operation.
///
/// Closing is how a writer tells its peer that no more bytes will follow.
/// For sinks with no peer (in-memory buffers, `io::Sink`) closing only
/// flushes.
pub trait Close {
    /// Close the sink. Closing twice is not an error.
    fn close(&mut self) -> io::Result<()>;
}

impl Close for Vec<u8> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Close for io::Sink {
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T: Close + ?Sized> Close for &mut T {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: Close + ?Sized> Close for Box<T> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
