//! AF_PACKET raw socket bound to one physical interface.
//!
//! The socket owns all link-level configuration: promiscuous
//! membership, the receive timeout, and the interface binding. It is
//! opened once per process and closed on drop.

use std::io;
use std::mem;
use std::time::Duration;

use anyhow::{bail, Result};
use libc::{c_int, c_void, socklen_t};

use crate::net::mac::MacAddr;

/// Link-level send/receive as the session sees it. `recv_frame`
/// returns `Ok(None)` when the receive timeout fires.
pub trait LinkTransport {
    fn send_frame(&self, dest_mac: MacAddr, frame: &[u8]) -> Result<usize>;
    fn recv_frame(&self, buf: &mut [u8]) -> Result<Option<usize>>;
}

pub struct RawSocket {
    sock: c_int,
    ifindex: c_int,
}

fn eth_p_all_be() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

impl RawSocket {
    /// Opens a raw packet socket on `interface`, joins promiscuous
    /// membership, and arms the receive timeout. Requires
    /// CAP_NET_RAW; any setup failure is fatal for the caller.
    pub fn open(interface: &str, recv_timeout: Duration) -> Result<Self> {
        let sock =
            unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, eth_p_all_be() as c_int) };
        if sock < 0 {
            bail!("fail to create raw socket: {}", os_error());
        }
        // Held in the guard from here on so the fd closes on any
        // early return below.
        let mut sock = RawSocket { sock, ifindex: 0 };

        let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
        if interface.len() >= ifr.ifr_name.len() {
            bail!("interface name {interface:?} is too long");
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(interface.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        if unsafe { libc::ioctl(sock.sock, libc::SIOCGIFINDEX, &mut ifr) } < 0 {
            bail!("fail to resolve interface {interface:?}: {}", os_error());
        }
        let ifindex = unsafe { ifr.ifr_ifru.ifru_ifindex };
        sock.ifindex = ifindex;

        // Promiscuous membership is scoped to the socket and released
        // by the kernel when it closes.
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as libc::c_ushort,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let rc = unsafe {
            libc::setsockopt(
                sock.sock,
                libc::SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                &mreq as *const _ as *const c_void,
                mem::size_of::<libc::packet_mreq>() as socklen_t,
            )
        };
        if rc < 0 {
            bail!("fail to set promiscuous mode: {}", os_error());
        }

        let tv = libc::timeval {
            tv_sec: recv_timeout.as_secs() as libc::time_t,
            tv_usec: recv_timeout.subsec_micros() as libc::suseconds_t,
        };
        let rc = unsafe {
            libc::setsockopt(
                sock.sock,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const _ as *const c_void,
                mem::size_of::<libc::timeval>() as socklen_t,
            )
        };
        if rc < 0 {
            bail!("fail to set receive timeout: {}", os_error());
        }

        // Bind so we only see traffic from this interface.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = eth_p_all_be();
        addr.sll_ifindex = ifindex;
        let rc = unsafe {
            libc::bind(
                sock.sock,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as socklen_t,
            )
        };
        if rc < 0 {
            bail!("fail to bind to interface {interface:?}: {}", os_error());
        }

        Ok(sock)
    }
}

impl LinkTransport for RawSocket {
    fn send_frame(&self, dest_mac: MacAddr, frame: &[u8]) -> Result<usize> {
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = eth_p_all_be();
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = MacAddr::LEN as libc::c_uchar;
        addr.sll_addr[..MacAddr::LEN].copy_from_slice(&dest_mac.octets());

        let nb = unsafe {
            libc::sendto(
                self.sock,
                frame.as_ptr() as *const c_void,
                frame.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as socklen_t,
            )
        };
        if nb < 0 {
            bail!("fail to send frame: {}", os_error());
        }
        Ok(nb as usize)
    }

    fn recv_frame(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        loop {
            let nb = unsafe { libc::recv(self.sock, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };
            if nb >= 0 {
                return Ok(Some(nb as usize));
            }
            let err = os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(None),
                io::ErrorKind::Interrupted => continue,
                _ => bail!("fail to receive frame: {err}"),
            }
        }
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        let code = unsafe { libc::close(self.sock) };
        if code < 0 {
            log::warn!("fail to close the raw socket: {}", os_error());
        }
    }
}

fn os_error() -> io::Error {
    io::Error::last_os_error()
}
