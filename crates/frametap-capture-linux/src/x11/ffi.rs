//! MIT-SHM bindings (`X11/extensions/XShm.h`), which the `x11` crate lacks.

#![allow(non_snake_case)]

use std::os::raw::{c_char, c_int, c_uint, c_ulong};

use ::x11::xlib::{Bool, Display, Drawable, Visual, XImage};

#[repr(C)]
#[derive(Debug)]
pub(crate) struct XShmSegmentInfo {
    pub shmseg: c_ulong,
    pub shmid: c_int,
    pub shmaddr: *mut c_char,
    pub read_only: Bool,
}

impl Default for XShmSegmentInfo {
    fn default() -> Self {
        Self { shmseg: 0, shmid: -1, shmaddr: std::ptr::null_mut(), read_only: 0 }
    }
}

#[link(name = "Xext")]
extern "C" {
    pub(crate) fn XShmQueryExtension(display: *mut Display) -> Bool;

    pub(crate) fn XShmCreateImage(
        display: *mut Display,
        visual: *mut Visual,
        depth: c_uint,
        format: c_int,
        data: *mut c_char,
        shminfo: *mut XShmSegmentInfo,
        width: c_uint,
        height: c_uint,
    ) -> *mut XImage;

    pub(crate) fn XShmAttach(display: *mut Display, shminfo: *mut XShmSegmentInfo) -> Bool;

    pub(crate) fn XShmDetach(display: *mut Display, shminfo: *mut XShmSegmentInfo) -> Bool;

    pub(crate) fn XShmGetImage(
        display: *mut Display,
        drawable: Drawable,
        image: *mut XImage,
        x: c_int,
        y: c_int,
        plane_mask: c_ulong,
    ) -> Bool;
}
